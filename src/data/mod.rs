//! Data module - raw export loading and reshaping

mod frame;
mod loader;
mod processor;
mod source;

pub use frame::{f64_values, i64_values, str_values, TidyFrames};
pub use loader::DataLoader;
pub use processor::{DataProcessor, ProcessorError};
pub use source::Source;
