//! Tables module - summary tables built from the tidy frames

mod builder;
mod education;

pub use builder::{overall_group_counts, TableBuilder};
pub use education::education_buckets;
