//! Charts module - Chart data preparation and rendering

mod renderer;
mod series;
mod style;

pub use renderer::StaticChartRenderer;
pub use style::ChartStyle;
