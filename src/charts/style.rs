//! Presentation style shared by all figures.

use font_kit::source::SystemSource;
use plotters::prelude::*;
use tracing::{debug, warn};

use crate::config::ChartConfig;

pub const FALLBACK_FONT: &str = "sans-serif";

/// Default matplotlib color cycle (tab10).
pub const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

pub const GRID: RGBAColor = RGBAColor(0, 0, 0, 0.25);

#[derive(Debug, Clone, PartialEq)]
pub struct ChartStyle {
    pub font_family: String,
    pub width: u32,
    pub height: u32,
    pub tall_height: u32,
}

impl ChartStyle {
    /// Pick the first installed font from the configured list.
    pub fn resolve(config: &ChartConfig) -> Self {
        let fonts = SystemSource::new();
        let font_family = pick_font(&config.preferred_fonts, |name| font_is_installed(&fonts, name));
        Self {
            font_family,
            width: config.width,
            height: config.height,
            tall_height: config.tall_height,
        }
    }

    pub fn font(&self, size: f64) -> FontDesc<'_> {
        (self.font_family.as_str(), size).into_font()
    }

    pub fn title_font(&self) -> FontDesc<'_> {
        self.font(40.0)
    }

    pub fn label_font(&self) -> FontDesc<'_> {
        self.font(26.0)
    }

    pub fn tick_font(&self) -> FontDesc<'_> {
        self.font(22.0)
    }

    pub fn color(index: usize) -> RGBColor {
        PALETTE[index % PALETTE.len()]
    }
}

/// First name in `preferred` accepted by `installed`, else [`FALLBACK_FONT`].
pub fn pick_font<F>(preferred: &[String], installed: F) -> String
where
    F: Fn(&str) -> bool,
{
    match preferred.iter().find(|name| installed(name.as_str())) {
        Some(name) => {
            debug!(font = %name, "using chart font");
            name.clone()
        }
        None => {
            warn!("no preferred Korean font installed, Hangul may not render");
            FALLBACK_FONT.to_string()
        }
    }
}

/// Exact family lookup. Loading through plotters would silently substitute
/// the system sans-serif for a missing family.
fn font_is_installed(fonts: &SystemSource, name: &str) -> bool {
    fonts
        .select_family_by_name(name)
        .map(|family| !family.fonts().is_empty())
        .unwrap_or(false)
}
