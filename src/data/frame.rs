//! Tidy frame set shared by the table and chart stages.

use polars::prelude::*;
use std::path::Path;
use tracing::info;

use super::loader::{DataLoader, LoaderError};
use super::source::Source;

/// One tidy DataFrame per source.
#[derive(Debug, Clone, Default)]
pub struct TidyFrames {
    pub period_type: DataFrame,
    pub kosis_prior: DataFrame,
    pub education: DataFrame,
    pub prior_record: DataFrame,
    pub world: DataFrame,
    pub e_nara: DataFrame,
}

impl TidyFrames {
    pub fn insert(&mut self, source: Source, df: DataFrame) {
        let slot = match source {
            Source::ProsecutionPeriodType => &mut self.period_type,
            Source::KosisPriorConvictions => &mut self.kosis_prior,
            Source::PoliceEducation => &mut self.education,
            Source::PolicePriorRecord => &mut self.prior_record,
            Source::WorldRecidivism => &mut self.world,
            Source::ENaraReimprisonment => &mut self.e_nara,
        };
        *slot = df;
    }

    /// Load every tidy CSV from `dir`, restoring numeric column types.
    pub fn load(dir: &Path) -> Result<Self, LoaderError> {
        let mut frames = Self::default();
        for source in Source::ALL {
            let path = dir.join(source.tidy_file_name());
            let df = restore_types(source, DataLoader::load_tidy(&path)?)?;
            info!(source = %source, rows = df.height(), "loaded tidy table");
            frames.insert(source, df);
        }
        Ok(frames)
    }
}

/// Cast the numeric columns of a string-typed tidy frame.
pub fn restore_types(source: Source, df: DataFrame) -> PolarsResult<DataFrame> {
    let casts = match source {
        Source::WorldRecidivism => vec![
            col("followup_years").cast(DataType::Float64),
            col("rate_pct").cast(DataType::Float64),
        ],
        Source::ENaraReimprisonment => vec![col("value").cast(DataType::Float64)],
        _ => vec![col("count").cast(DataType::Int64)],
    };
    df.lazy().with_columns(casts).collect()
}

/// String column as owned values; nulls become "".
pub fn str_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<String>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

/// Integer column; nulls become 0.
pub fn i64_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<i64>> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().map(|v| v.unwrap_or(0)).collect())
}

pub fn f64_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}
