//! Static Chart Renderer
//! Draws the presentation figures as PNG files.
//!
//! Figures:
//! 1. Domestic three-year reimprisonment rate by year (lines)
//! 2. Elapsed time until reoffence, share per category (lines)
//! 3. Crimes with the most reoffenders (horizontal bars)
//! 4. Prior conviction composition (bars with % labels)
//! 5. Education level buckets (bars with % labels)
//! 6. International reimprisonment rates at 1-5 year follow-up (lines)

use plotters::coord::ranged1d::SegmentValue;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use polars::prelude::PolarsError;
use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::series::{self, Bar, Series, PERIOD_ORDER};
use super::style::{ChartStyle, GRID};
use crate::data::TidyFrames;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Failed to draw {path}: {message}")]
    Draw { path: String, message: String },
    #[error("No data to plot for {0}")]
    Empty(&'static str),
    #[error("Failed to create {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

type DrawResult = Result<(), Box<dyn StdError>>;

/// The fixed set of figures, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Figure {
    DomesticTrend,
    ReoffendTiming,
    TopCrimes,
    PriorConvictions,
    EducationBuckets,
    WorldFollowup,
}

impl Figure {
    pub const ALL: [Figure; 6] = [
        Figure::DomesticTrend,
        Figure::ReoffendTiming,
        Figure::TopCrimes,
        Figure::PriorConvictions,
        Figure::EducationBuckets,
        Figure::WorldFollowup,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Figure::DomesticTrend => "01_domestic_3yr_reimprisonment_trend.png",
            Figure::ReoffendTiming => "02_reoffend_time_distribution.png",
            Figure::TopCrimes => "03_top_crimes_reoffenders.png",
            Figure::PriorConvictions => "04_prior_conviction_share_2023.png",
            Figure::EducationBuckets => "05_education_bucket_share_2020.png",
            Figure::WorldFollowup => "06_world_recidivism_followup_lines.png",
        }
    }
}

fn padded_max(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.fold(0.0, f64::max);
    if max > 0.0 {
        max * 1.15
    } else {
        1.0
    }
}

/// Renders figures from the tidy frames.
pub struct StaticChartRenderer<'a> {
    style: &'a ChartStyle,
    top_n: usize,
}

impl<'a> StaticChartRenderer<'a> {
    pub fn new(style: &'a ChartStyle, top_n: usize) -> Self {
        Self { style, top_n }
    }

    /// Render every figure into `dir`. Figures without data are skipped with a
    /// warning; any other failure aborts.
    pub fn render_all(&self, frames: &TidyFrames, dir: &Path) -> Result<Vec<PathBuf>, ChartError> {
        fs::create_dir_all(dir).map_err(|source| ChartError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let mut written = Vec::new();
        for figure in Figure::ALL {
            let path = dir.join(figure.file_name());
            match self.render(figure, frames, &path) {
                Ok(()) => {
                    info!(path = %path.display(), "figure saved");
                    written.push(path);
                }
                Err(ChartError::Empty(name)) => warn!(figure = name, "no data, figure skipped"),
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    pub fn render(&self, figure: Figure, frames: &TidyFrames, path: &Path) -> Result<(), ChartError> {
        let drawn = match figure {
            Figure::DomesticTrend => {
                let lines = series::domestic_trend_series(&frames.e_nara)?;
                if lines.is_empty() {
                    return Err(ChartError::Empty("domestic reimprisonment trend"));
                }
                self.draw_domestic_trend(&lines, path)
            }
            Figure::ReoffendTiming => {
                let lines = series::period_share_series(&frames.period_type)?;
                if lines.is_empty() {
                    return Err(ChartError::Empty("reoffence timing"));
                }
                self.draw_reoffend_timing(&lines, path)
            }
            Figure::TopCrimes => {
                let top = series::top_crimes(&frames.period_type, self.top_n)?;
                if top.is_empty() {
                    return Err(ChartError::Empty("top crimes"));
                }
                self.draw_top_crimes(&top, path)
            }
            Figure::PriorConvictions => {
                let bars = series::prior_conviction_composition(&frames.kosis_prior)?;
                if bars.iter().all(|b| b.count == 0) {
                    return Err(ChartError::Empty("prior conviction composition"));
                }
                self.draw_share_bars(&bars, "범죄자 전과 유무 구성비(2023)", path)
            }
            Figure::EducationBuckets => {
                let bars = series::education_bucket_shares(&frames.education)?;
                if bars.iter().all(|b| b.count == 0) {
                    return Err(ChartError::Empty("education buckets"));
                }
                self.draw_share_bars(&bars, "범죄자 교육수준 분포(2020, 버킷)", path)
            }
            Figure::WorldFollowup => {
                let lines = series::world_followup_series(&frames.world)?;
                if lines.is_empty() {
                    return Err(ChartError::Empty("world follow-up"));
                }
                self.draw_world_followup(&lines, path)
            }
        };

        drawn.map_err(|e| ChartError::Draw {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn draw_domestic_trend(&self, lines: &[Series<i32>], path: &Path) -> DrawResult {
        let style = self.style;
        let years = lines.iter().flat_map(|s| s.points.iter().map(|&(x, _)| x));
        let min_year = years.clone().min().unwrap_or(0);
        let max_year = years.max().unwrap_or(0);
        let y_max = padded_max(lines.iter().flat_map(|s| s.points.iter().map(|&(_, y)| y)));

        let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("출소자 3년 이내 재복역률 추이", style.title_font())
            .margin(30)
            .x_label_area_size(80)
            .y_label_area_size(100)
            .build_cartesian_2d((min_year - 1)..(max_year + 1), 0f64..y_max)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .light_line_style(WHITE)
            .bold_line_style(GRID)
            .x_labels((max_year - min_year + 3) as usize)
            .x_label_formatter(&|y| {
                if (min_year..=max_year).contains(y) {
                    y.to_string()
                } else {
                    String::new()
                }
            })
            .x_desc("연도")
            .y_desc("재복역률(%)")
            .label_style(style.tick_font())
            .axis_desc_style(style.label_font())
            .draw()?;

        for (idx, line) in lines.iter().enumerate() {
            let color = ChartStyle::color(idx);
            chart
                .draw_series(LineSeries::new(line.points.iter().copied(), color.stroke_width(3)))?
                .label(line.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color.stroke_width(3)));
            chart.draw_series(line.points.iter().map(|&p| Circle::new(p, 6, color.filled())))?;
        }

        chart
            .configure_series_labels()
            .label_font(style.tick_font())
            .background_style(WHITE.mix(0.8))
            .border_style(WHITE)
            .position(SeriesLabelPosition::LowerRight)
            .draw()?;

        root.present()?;
        Ok(())
    }

    fn draw_reoffend_timing(&self, lines: &[Series<usize>], path: &Path) -> DrawResult {
        let style = self.style;
        let y_max = padded_max(lines.iter().flat_map(|s| s.points.iter().map(|&(_, y)| y)));

        let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("재범까지 경과기간 분포(비중)", style.title_font())
            .margin(30)
            .x_label_area_size(80)
            .y_label_area_size(100)
            .build_cartesian_2d((0..PERIOD_ORDER.len()).into_segmented(), 0f64..y_max)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .light_line_style(WHITE)
            .bold_line_style(GRID)
            .x_labels(PERIOD_ORDER.len())
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) => PERIOD_ORDER.get(*i).map(|p| p.to_string()).unwrap_or_default(),
                _ => String::new(),
            })
            .x_desc("경과기간")
            .y_desc("비중(%)")
            .label_style(style.tick_font())
            .axis_desc_style(style.label_font())
            .draw()?;

        for (idx, line) in lines.iter().enumerate() {
            let color = ChartStyle::color(idx);
            let points: Vec<(SegmentValue<usize>, f64)> = line
                .points
                .iter()
                .map(|&(i, y)| (SegmentValue::CenterOf(i), y))
                .collect();
            chart
                .draw_series(LineSeries::new(points.iter().cloned(), color.stroke_width(3)))?
                .label(line.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color.stroke_width(3)));
            chart.draw_series(points.into_iter().map(|p| Circle::new(p, 6, color.filled())))?;
        }

        chart
            .configure_series_labels()
            .label_font(style.tick_font())
            .background_style(WHITE.mix(0.8))
            .border_style(WHITE)
            .position(SeriesLabelPosition::UpperRight)
            .draw()?;

        root.present()?;
        Ok(())
    }

    /// Names the configured limit even when fewer crimes are available.
    fn top_crimes_title(&self) -> String {
        format!("재범자 수 상위 {} 범죄유형(집계)", self.top_n)
    }

    fn draw_top_crimes(&self, top: &[(String, i64)], path: &Path) -> DrawResult {
        let style = self.style;
        // Smallest first so the largest bar ends up on top
        let items: Vec<&(String, i64)> = top.iter().rev().collect();
        let x_max = padded_max(items.iter().map(|(_, c)| *c as f64));

        let root = BitMapBackend::new(path, (style.width, style.tall_height)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(self.top_crimes_title(), style.title_font())
            .margin(30)
            .x_label_area_size(80)
            .y_label_area_size(320)
            .build_cartesian_2d(0f64..x_max, (0..items.len()).into_segmented())?;

        chart
            .configure_mesh()
            .disable_y_mesh()
            .light_line_style(WHITE)
            .bold_line_style(GRID)
            .y_labels(items.len())
            .y_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) => items.get(*i).map(|(name, _)| name.clone()).unwrap_or_default(),
                _ => String::new(),
            })
            .x_label_formatter(&|x| format!("{:.0}", x))
            .x_desc("재범자 수(명)")
            .label_style(style.tick_font())
            .axis_desc_style(style.label_font())
            .draw()?;

        chart.draw_series(
            Histogram::horizontal(&chart)
                .style(ChartStyle::color(0).filled())
                .margin(8)
                .data(items.iter().enumerate().map(|(i, (_, c))| (i, *c as f64))),
        )?;

        root.present()?;
        Ok(())
    }

    fn draw_share_bars(&self, bars: &[Bar], title: &str, path: &Path) -> DrawResult {
        let style = self.style;
        let y_max = padded_max(bars.iter().map(|b| b.share_pct));

        let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, style.title_font())
            .margin(30)
            .x_label_area_size(80)
            .y_label_area_size(100)
            .build_cartesian_2d((0..bars.len()).into_segmented(), 0f64..y_max)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .light_line_style(WHITE)
            .bold_line_style(GRID)
            .x_labels(bars.len())
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) => bars.get(*i).map(|b| b.label.clone()).unwrap_or_default(),
                _ => String::new(),
            })
            .y_desc("비중(%)")
            .label_style(style.tick_font())
            .axis_desc_style(style.label_font())
            .draw()?;

        chart.draw_series(
            Histogram::vertical(&chart)
                .style(ChartStyle::color(0).filled())
                .margin(60)
                .data(bars.iter().enumerate().map(|(i, b)| (i, b.share_pct))),
        )?;

        let value_style = TextStyle::from(style.font(22.0)).pos(Pos::new(HPos::Center, VPos::Bottom));
        chart.draw_series(bars.iter().enumerate().map(|(i, b)| {
            Text::new(
                format!("{:.1}%", b.share_pct),
                (SegmentValue::CenterOf(i), b.share_pct),
                value_style.clone(),
            )
        }))?;

        root.present()?;
        Ok(())
    }

    fn draw_world_followup(&self, lines: &[Series<i32>], path: &Path) -> DrawResult {
        let style = self.style;
        let y_max = padded_max(lines.iter().flat_map(|s| s.points.iter().map(|&(_, y)| y)));
        // 9 x 5.5 inches
        let height = style.height + style.height / 10;

        let root = BitMapBackend::new(path, (style.width, height)).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("국가별 재복역률 비교(재수감, 추적 1~5년)", style.title_font())
            .margin(30)
            .x_label_area_size(80)
            .y_label_area_size(100)
            .build_cartesian_2d(0i32..6i32, 0f64..y_max)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .light_line_style(WHITE)
            .bold_line_style(GRID)
            .x_labels(7)
            .x_label_formatter(&|y| {
                if (1..=5).contains(y) {
                    y.to_string()
                } else {
                    String::new()
                }
            })
            .x_desc("추적기간(년)")
            .y_desc("재복역률(%)")
            .label_style(style.tick_font())
            .axis_desc_style(style.label_font())
            .draw()?;

        for (idx, line) in lines.iter().enumerate() {
            let color = ChartStyle::color(idx);
            chart
                .draw_series(LineSeries::new(line.points.iter().copied(), color.stroke_width(3)))?
                .label(line.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color.stroke_width(3)));
            chart.draw_series(line.points.iter().map(|&p| Circle::new(p, 6, color.filled())))?;
        }

        chart
            .configure_series_labels()
            .label_font(style.tick_font())
            .background_style(WHITE.mix(0.8))
            .border_style(WHITE)
            .position(SeriesLabelPosition::LowerRight)
            .draw()?;

        root.present()?;
        Ok(())
    }
}
