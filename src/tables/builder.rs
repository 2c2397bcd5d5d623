//! Table Builder Module
//! Group-and-sum summaries written to the outputs directory.

use polars::prelude::*;
use thiserror::Error;

use super::education::education_buckets;
use crate::data::TidyFrames;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

const TOTAL: &str = "합계";
const SUBTOTAL: &str = "소계";
const NO_PRIOR: &str = "전과없음";
const PRIOR: &str = "전과";
const DOMESTIC_METRIC: &str = "재복역기간3년이내";

/// The five summary tables.
#[derive(Debug, Clone)]
pub struct SummaryTables {
    pub prior_share: DataFrame,
    pub period_distribution: DataFrame,
    pub education_share: DataFrame,
    pub country_comparison: DataFrame,
    pub domestic_trend: DataFrame,
}

impl SummaryTables {
    /// Output file name for each table.
    pub fn entries(&self) -> [(&'static str, &DataFrame); 5] {
        [
            ("H1_prior_share_2023.csv", &self.prior_share),
            ("H2_period_distribution.csv", &self.period_distribution),
            ("H3_education_bucket_share_2020.csv", &self.education_share),
            ("H4_country_1y_5y.csv", &self.country_comparison),
            ("domestic_3yr_reimprisonment_rate.csv", &self.domestic_trend),
        ]
    }
}

/// Per (year, group) counts of the KOSIS overall-total row (합계/소계/소계).
///
/// A group's `소계` detail is used when present; otherwise its detail rows
/// are summed. Output columns: ["year", "group", "count"]
pub fn overall_group_counts(kosis: &DataFrame) -> PolarsResult<DataFrame> {
    kosis
        .clone()
        .lazy()
        .filter(
            col("crime_lvl1")
                .eq(lit(TOTAL))
                .and(col("crime_lvl2").eq(lit(SUBTOTAL)))
                .and(col("crime_lvl3").eq(lit(SUBTOTAL))),
        )
        .group_by_stable([col("year"), col("group")])
        .agg([
            col("count")
                .filter(col("detail").eq(lit(SUBTOTAL)))
                .sum()
                .alias("subtotal"),
            col("count")
                .filter(col("detail").neq(lit(SUBTOTAL)))
                .sum()
                .alias("detail_sum"),
            col("detail").eq(lit(SUBTOTAL)).any(true).alias("has_subtotal"),
        ])
        .select([
            col("year"),
            col("group"),
            when(col("has_subtotal"))
                .then(col("subtotal"))
                .otherwise(col("detail_sum"))
                .alias("count"),
        ])
        .collect()
}

/// Builds the summary tables.
pub struct TableBuilder;

impl TableBuilder {
    pub fn build(frames: &TidyFrames) -> Result<SummaryTables, TableError> {
        Ok(SummaryTables {
            prior_share: Self::prior_share(&frames.kosis_prior)?,
            period_distribution: Self::period_distribution(&frames.period_type)?,
            education_share: Self::education_share(&frames.education)?,
            country_comparison: Self::country_comparison(&frames.world)?,
            domestic_trend: Self::domestic_trend(&frames.e_nara)?,
        })
    }

    /// Reoffenders per (recid_type, period), largest first within a type.
    /// Equal counts are ordered by period label.
    pub fn period_distribution(period_type: &DataFrame) -> Result<DataFrame, TableError> {
        Ok(period_type
            .clone()
            .lazy()
            .group_by([col("recid_type"), col("period")])
            .agg([col("count").sum()])
            .sort(
                ["recid_type", "count", "period"],
                SortMultipleOptions::default()
                    .with_order_descending_multi([false, true, false])
                    .with_maintain_order(true),
            )
            .collect()?)
    }

    /// Share of offenders with and without prior convictions per year.
    pub fn prior_share(kosis: &DataFrame) -> Result<DataFrame, TableError> {
        Ok(overall_group_counts(kosis)?
            .lazy()
            .filter(col("group").eq(lit(NO_PRIOR)).or(col("group").eq(lit(PRIOR))))
            .with_column(
                (col("count").cast(DataType::Float64)
                    / col("count").sum().over([col("year")]).cast(DataType::Float64))
                .alias("share"),
            )
            .sort(["year", "group"], SortMultipleOptions::default())
            .collect()?)
    }

    /// Offenders per education bucket with share of the total.
    pub fn education_share(edu: &DataFrame) -> Result<DataFrame, TableError> {
        let buckets = education_buckets(edu)?;
        let total: i64 = buckets.iter().map(|(_, c)| c).sum();

        let labels: Vec<&str> = buckets.iter().map(|(b, _)| b.label()).collect();
        let counts: Vec<i64> = buckets.iter().map(|(_, c)| *c).collect();
        let shares: Vec<Option<f64>> = counts
            .iter()
            .map(|&c| (total > 0).then(|| c as f64 / total as f64))
            .collect();

        Ok(DataFrame::new(vec![
            Column::new("bucket".into(), labels),
            Column::new("count".into(), counts),
            Column::new("share".into(), shares),
        ])?)
    }

    /// Country rates at one- and five-year follow-up.
    pub fn country_comparison(world: &DataFrame) -> Result<DataFrame, TableError> {
        Ok(world
            .clone()
            .lazy()
            .filter(
                col("followup_years")
                    .eq(lit(1.0))
                    .or(col("followup_years").eq(lit(5.0))),
            )
            .collect()?)
    }

    /// Domestic three-year reimprisonment rate rows.
    pub fn domestic_trend(e_nara: &DataFrame) -> Result<DataFrame, TableError> {
        Ok(e_nara
            .clone()
            .lazy()
            .filter(col("metric").str().contains_literal(lit(DOMESTIC_METRIC)))
            .collect()?)
    }
}
