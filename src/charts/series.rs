//! Chart Series Module
//! Turns tidy frames into the plain series each figure draws.

use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};

use crate::data::{f64_values, i64_values, str_values};
use crate::tables::{education_buckets, overall_group_counts};

/// Display order of the elapsed-time categories.
pub const PERIOD_ORDER: [&str; 7] = [
    "1개월이내",
    "3개월이내",
    "6개월이내",
    "1년이내",
    "2년이내",
    "3년이내",
    "3년초과",
];

/// Countries shown in the international comparison.
pub const WORLD_COUNTRIES: [&str; 5] = [
    "France",
    "United States",
    "New Zealand",
    "Israel",
    "South Korea",
];

/// A labelled line.
#[derive(Debug, Clone, PartialEq)]
pub struct Series<X> {
    pub label: String,
    pub points: Vec<(X, f64)>,
}

/// A labelled bar with its raw count and percentage share.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    pub count: i64,
    pub share_pct: f64,
}

fn with_shares(items: Vec<(String, i64)>) -> Vec<Bar> {
    let total: i64 = items.iter().map(|(_, c)| c).sum();
    items
        .into_iter()
        .map(|(label, count)| Bar {
            label,
            count,
            share_pct: if total > 0 {
                100.0 * count as f64 / total as f64
            } else {
                0.0
            },
        })
        .collect()
}

/// Reimprisonment-period metrics by year, one line per metric in order of
/// first appearance.
pub fn domestic_trend_series(e_nara: &DataFrame) -> PolarsResult<Vec<Series<i32>>> {
    let metrics = str_values(e_nara, "metric")?;
    let years = str_values(e_nara, "year")?;
    let values = f64_values(e_nara, "value")?;

    let mut series: Vec<Series<i32>> = Vec::new();
    for ((metric, year), value) in metrics.into_iter().zip(years).zip(values) {
        if !metric.contains("재복역기간") {
            continue;
        }
        let (Ok(year), Some(value)) = (year.trim().parse::<i32>(), value) else {
            continue;
        };
        match series.iter_mut().find(|s| s.label == metric) {
            Some(s) => s.points.push((year, value)),
            None => series.push(Series {
                label: metric,
                points: vec![(year, value)],
            }),
        }
    }

    for s in &mut series {
        s.points.sort_by_key(|&(year, _)| year);
    }
    Ok(series)
}

/// Share of reoffenders per elapsed-time category, one line per recid type.
///
/// X values index into [`PERIOD_ORDER`]; unknown periods are ignored.
pub fn period_share_series(period_type: &DataFrame) -> PolarsResult<Vec<Series<usize>>> {
    let types = str_values(period_type, "recid_type")?;
    let periods = str_values(period_type, "period")?;
    let counts = i64_values(period_type, "count")?;

    let mut totals: BTreeMap<String, [i64; PERIOD_ORDER.len()]> = BTreeMap::new();
    for ((recid_type, period), count) in types.into_iter().zip(periods).zip(counts) {
        let Some(idx) = PERIOD_ORDER.iter().position(|p| *p == period) else {
            continue;
        };
        totals.entry(recid_type).or_insert([0; PERIOD_ORDER.len()])[idx] += count;
    }

    Ok(totals
        .into_iter()
        .map(|(label, counts)| {
            let total: i64 = counts.iter().sum();
            let points = counts
                .iter()
                .enumerate()
                .map(|(idx, &c)| {
                    let share = if total > 0 {
                        100.0 * c as f64 / total as f64
                    } else {
                        0.0
                    };
                    (idx, share)
                })
                .collect();
            Series { label, points }
        })
        .collect())
}

/// Crimes with the most reoffenders, largest first.
pub fn top_crimes(period_type: &DataFrame, n: usize) -> PolarsResult<Vec<(String, i64)>> {
    let totals = period_type
        .clone()
        .lazy()
        .group_by([col("crime")])
        .agg([col("count").sum()])
        .sort(
            ["count", "crime"],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .limit(n as IdxSize)
        .collect()?;

    let crimes = str_values(&totals, "crime")?;
    let counts = i64_values(&totals, "count")?;
    Ok(crimes.into_iter().zip(counts).collect())
}

/// Offenders without priors, with one or more priors, and unknown.
pub fn prior_conviction_composition(kosis: &DataFrame) -> PolarsResult<Vec<Bar>> {
    let counts = overall_group_counts(kosis)?;
    let groups = str_values(&counts, "group")?;
    let values = i64_values(&counts, "count")?;

    let mut by_group: HashMap<String, i64> = HashMap::new();
    for (group, count) in groups.into_iter().zip(values) {
        *by_group.entry(group).or_default() += count;
    }

    let categories = [
        ("전과없음", "전과없음"),
        ("전과", "전과(1회 이상)"),
        ("미상", "미상"),
    ];
    Ok(with_shares(
        categories
            .iter()
            .map(|(group, label)| (label.to_string(), by_group.get(*group).copied().unwrap_or(0)))
            .collect(),
    ))
}

/// Education bucket shares, largest first.
pub fn education_bucket_shares(edu: &DataFrame) -> PolarsResult<Vec<Bar>> {
    let buckets = education_buckets(edu)?
        .into_iter()
        .map(|(bucket, count)| (bucket.label().to_string(), count))
        .collect();

    let mut bars = with_shares(buckets);
    bars.sort_by(|a, b| b.share_pct.total_cmp(&a.share_pct));
    Ok(bars)
}

/// Reimprisonment rates at one to five years for the selected countries,
/// one line per country in alphabetical order.
///
/// When a country has several studies for the same follow-up length the one
/// with the greatest period label is kept.
pub fn world_followup_series(world: &DataFrame) -> PolarsResult<Vec<Series<i32>>> {
    let countries = str_values(world, "country")?;
    let followups = f64_values(world, "followup_years")?;
    let rates = f64_values(world, "rate_pct")?;
    let kinds = str_values(world, "type")?;
    let periods = str_values(world, "period")?;

    let mut latest: BTreeMap<(String, i32), (String, f64)> = BTreeMap::new();
    for i in 0..countries.len() {
        if !kinds[i].trim().eq_ignore_ascii_case("reimprisonment") {
            continue;
        }
        if !WORLD_COUNTRIES.contains(&countries[i].as_str()) {
            continue;
        }
        let (Some(years), Some(rate)) = (followups[i], rates[i]) else {
            continue;
        };
        if years.fract() != 0.0 || !(1.0..=5.0).contains(&years) {
            continue;
        }

        let key = (countries[i].clone(), years as i32);
        let keep = latest
            .get(&key)
            .map_or(true, |(period, _)| periods[i] >= *period);
        if keep {
            latest.insert(key, (periods[i].clone(), rate));
        }
    }

    let mut series: Vec<Series<i32>> = Vec::new();
    for ((country, years), (_, rate)) in latest {
        match series.last_mut() {
            Some(s) if s.label == country => s.points.push((years, rate)),
            _ => series.push(Series {
                label: country,
                points: vec![(years, rate)],
            }),
        }
    }
    Ok(series)
}
