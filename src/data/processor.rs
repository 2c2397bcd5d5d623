//! Data Processor Module
//! Reshapes each raw export from wide to tidy long form (melt operation).

use polars::prelude::*;
use regex::Regex;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use super::loader::{DataLoader, LoaderError, RawTable};
use super::source::Source;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),
    #[error("{source_name}: required column '{column}' not found")]
    MissingColumn { source_name: String, column: String },
    #[error("{0}: expected two header rows below the column names")]
    MissingHeaderRows(String),
    #[error("Could not find the year-header row in the Excel sheet")]
    HeaderRowNotFound,
}

/// Parse a count cell: trims, drops thousands separators, truncates decimals.
pub fn parse_count(cell: &str) -> Option<i64> {
    parse_number(cell).map(|v| v as i64)
}

/// Parse a numeric cell; `None` for blanks, dashes and other text.
pub fn parse_number(cell: &str) -> Option<f64> {
    let cleaned = cell.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn require_column(table: &RawTable, source: Source, column: &str) -> Result<usize, ProcessorError> {
    table
        .column_index(column)
        .ok_or_else(|| ProcessorError::MissingColumn {
            source_name: source.to_string(),
            column: column.to_string(),
        })
}

/// Handles cleaning and reshaping of the raw exports.
pub struct DataProcessor;

impl DataProcessor {
    /// Read the raw export for `source` from `raw_dir` and return its tidy frame.
    pub fn process_source(source: Source, raw_dir: &Path) -> Result<DataFrame, ProcessorError> {
        let path = raw_dir.join(source.raw_file_name());
        debug!(source = %source, path = %path.display(), "reading raw export");

        let read_csv = || DataLoader::read_csv(&path, source.format());
        match source {
            Source::ProsecutionPeriodType => Self::clean_prosecution_period_type(&read_csv()?),
            Source::KosisPriorConvictions => Self::clean_kosis_prior_convictions(&read_csv()?),
            Source::PoliceEducation => Self::clean_police_education(&read_csv()?),
            Source::PolicePriorRecord => Self::clean_police_prior_record(&read_csv()?),
            Source::WorldRecidivism => Self::clean_world_recidivism(&read_csv()?),
            Source::ENaraReimprisonment => {
                Self::clean_enara_reimprisonment(DataLoader::read_excel_first_sheet(&path)?)
            }
        }
    }

    /// Prosecution export: one row per crime, one column per
    /// `<동종재범|이종재범>_<period>`.
    ///
    /// Output columns: ["crime", "recid_type", "period", "count"]
    pub fn clean_prosecution_period_type(table: &RawTable) -> Result<DataFrame, ProcessorError> {
        let source = Source::ProsecutionPeriodType;
        let id = require_column(table, source, "범죄분류")?;
        let pattern = Regex::new(r"(동종재범|이종재범)_(.+)")?;

        let mut value_cols: Vec<(usize, String, String)> = Vec::new();
        for (idx, header) in table.headers.iter().enumerate() {
            if idx == id {
                continue;
            }
            match pattern.captures(header) {
                Some(caps) => value_cols.push((idx, caps[1].to_string(), caps[2].to_string())),
                None => warn!(source = %source, column = %header, "skipping column without reoffence type"),
            }
        }

        let mut crimes: Vec<String> = Vec::new();
        let mut recid_types: Vec<String> = Vec::new();
        let mut periods: Vec<String> = Vec::new();
        let mut counts: Vec<i64> = Vec::new();

        for (idx, recid_type, period) in &value_cols {
            for row in &table.rows {
                crimes.push(row[id].trim().to_string());
                recid_types.push(recid_type.clone());
                periods.push(period.clone());
                counts.push(parse_count(&row[*idx]).unwrap_or(0));
            }
        }

        Ok(DataFrame::new(vec![
            Column::new("crime".into(), crimes),
            Column::new("recid_type".into(), recid_types),
            Column::new("period".into(), periods),
            Column::new("count".into(), counts),
        ])?)
    }

    /// KOSIS export: the first two data rows are extra header rows (group and
    /// detail) under year-named columns.
    ///
    /// Output columns: ["year", "crime_lvl1", "crime_lvl2", "crime_lvl3", "group", "detail", "count"]
    pub fn clean_kosis_prior_convictions(table: &RawTable) -> Result<DataFrame, ProcessorError> {
        let source = Source::KosisPriorConvictions;
        let lvl1 = require_column(table, source, "범죄별(1)")?;
        let lvl2 = require_column(table, source, "범죄별(2)")?;
        let lvl3 = require_column(table, source, "범죄별(3)")?;
        if table.height() < 2 {
            return Err(ProcessorError::MissingHeaderRows(source.to_string()));
        }

        let year_re = Regex::new(r"\d{4}")?;
        let top = &table.rows[0];
        let sub = &table.rows[1];

        let metric_cols: Vec<(usize, String)> = (0..table.headers.len())
            .filter(|idx| ![lvl1, lvl2, lvl3].contains(idx))
            .map(|idx| {
                let header = &table.headers[idx];
                let year = year_re
                    .find(header)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| header.clone());
                let name = [year.as_str(), top[idx].trim(), sub[idx].trim()]
                    .iter()
                    .filter(|part| !part.is_empty())
                    .copied()
                    .collect::<Vec<_>>()
                    .join("_");
                (idx, name)
            })
            .collect();

        let mut years: Vec<String> = Vec::new();
        let mut lvl1s: Vec<String> = Vec::new();
        let mut lvl2s: Vec<String> = Vec::new();
        let mut lvl3s: Vec<String> = Vec::new();
        let mut groups: Vec<String> = Vec::new();
        let mut details: Vec<String> = Vec::new();
        let mut counts: Vec<i64> = Vec::new();

        let body = table.rows[2..]
            .iter()
            .filter(|row| !row[lvl1].contains("범죄별"));

        for row in body {
            for (idx, metric) in &metric_cols {
                let Some(count) = parse_count(&row[*idx]) else {
                    continue;
                };
                let mut parts = metric.splitn(3, '_');
                years.push(parts.next().unwrap_or_default().to_string());
                groups.push(parts.next().unwrap_or_default().to_string());
                details.push(parts.next().unwrap_or_default().to_string());
                lvl1s.push(row[lvl1].trim().to_string());
                lvl2s.push(row[lvl2].trim().to_string());
                lvl3s.push(row[lvl3].trim().to_string());
                counts.push(count);
            }
        }

        Ok(DataFrame::new(vec![
            Column::new("year".into(), years),
            Column::new("crime_lvl1".into(), lvl1s),
            Column::new("crime_lvl2".into(), lvl2s),
            Column::new("crime_lvl3".into(), lvl3s),
            Column::new("group".into(), groups),
            Column::new("detail".into(), details),
            Column::new("count".into(), counts),
        ])?)
    }

    /// Output columns: ["crime_major", "crime_minor", "education", "count"]
    pub fn clean_police_education(table: &RawTable) -> Result<DataFrame, ProcessorError> {
        Self::melt_police_counts(table, Source::PoliceEducation, "education")
    }

    /// Output columns: ["crime_major", "crime_minor", "prior_record", "count"]
    pub fn clean_police_prior_record(table: &RawTable) -> Result<DataFrame, ProcessorError> {
        Self::melt_police_counts(table, Source::PolicePriorRecord, "prior_record")
    }

    /// Police exports share a layout: two crime classification columns, then
    /// one count column per category.
    fn melt_police_counts(
        table: &RawTable,
        source: Source,
        var_name: &str,
    ) -> Result<DataFrame, ProcessorError> {
        let major = require_column(table, source, "범죄대분류")?;
        let minor = require_column(table, source, "범죄중분류")?;

        let mut majors: Vec<String> = Vec::new();
        let mut minors: Vec<String> = Vec::new();
        let mut categories: Vec<String> = Vec::new();
        let mut counts: Vec<i64> = Vec::new();

        for (idx, header) in table.headers.iter().enumerate() {
            if idx == major || idx == minor {
                continue;
            }
            for row in &table.rows {
                majors.push(row[major].trim().to_string());
                minors.push(row[minor].trim().to_string());
                categories.push(header.clone());
                counts.push(parse_count(&row[idx]).unwrap_or(0));
            }
        }

        Ok(DataFrame::new(vec![
            Column::new("crime_major".into(), majors),
            Column::new("crime_minor".into(), minors),
            Column::new(var_name.into(), categories),
            Column::new("count".into(), counts),
        ])?)
    }

    /// International comparison table, already long.
    ///
    /// Output columns: ["country", "followup_years", "rate_pct", "type", "period"]
    pub fn clean_world_recidivism(table: &RawTable) -> Result<DataFrame, ProcessorError> {
        let source = Source::WorldRecidivism;
        let country = require_column(table, source, "Country")?;
        let rate = require_column(table, source, "Rate")?;
        let follow_up = require_column(table, source, "Follow-Up")?;
        let kind = require_column(table, source, "Type")?;
        let duration = require_column(table, source, "Duration")?;

        let number_re = Regex::new(r"(\d+\.?\d*)")?;

        let mut countries: Vec<String> = Vec::new();
        let mut followups: Vec<Option<f64>> = Vec::new();
        let mut rates: Vec<Option<f64>> = Vec::new();
        let mut kinds: Vec<String> = Vec::new();
        let mut durations: Vec<String> = Vec::new();

        for row in &table.rows {
            let follow_text = &row[follow_up];
            let years = number_re
                .captures(follow_text)
                .and_then(|caps| caps[1].parse::<f64>().ok())
                .map(|n| {
                    if follow_text.to_lowercase().contains("month") {
                        n / 12.0
                    } else {
                        n
                    }
                });

            countries.push(row[country].trim().to_string());
            followups.push(years);
            rates.push(parse_number(&row[rate].replace('%', "")));
            kinds.push(row[kind].trim().to_string());
            durations.push(row[duration].trim().to_string());
        }

        Ok(DataFrame::new(vec![
            Column::new("country".into(), countries),
            Column::new("followup_years".into(), followups),
            Column::new("rate_pct".into(), rates),
            Column::new("type".into(), kinds),
            Column::new("period".into(), durations),
        ])?)
    }

    /// e-나라지표 workbook: title and note rows surround a year-header row.
    ///
    /// Output columns: ["metric", "year", "value"]
    pub fn clean_enara_reimprisonment(grid: Vec<Vec<String>>) -> Result<DataFrame, ProcessorError> {
        let header_row = grid
            .iter()
            .position(|row| {
                let joined = row
                    .iter()
                    .filter(|cell| !cell.is_empty())
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" ");
                joined.contains("2019") && joined.contains("2020")
            })
            .ok_or(ProcessorError::HeaderRowNotFound)?;

        let table = RawTable::from_grid(grid.into_iter().skip(header_row).collect());

        let year_cols: Vec<usize> = (1..table.headers.len())
            .filter(|&idx| !table.headers[idx].trim().is_empty())
            .collect();

        let mut metrics: Vec<String> = Vec::new();
        let mut years: Vec<String> = Vec::new();
        let mut values: Vec<f64> = Vec::new();

        let body = table.rows.iter().filter(|row| {
            let metric = row.first().map(|m| m.trim()).unwrap_or_default();
            !metric.is_empty() && !metric.contains("출처")
        });

        // Melt column by column so rows stay grouped per year
        let body: Vec<&Vec<String>> = body.collect();
        for &idx in &year_cols {
            for row in &body {
                let Some(value) = parse_number(&row[idx]) else {
                    continue;
                };
                metrics.push(row[0].trim().to_string());
                years.push(table.headers[idx].trim().to_string());
                values.push(value);
            }
        }

        Ok(DataFrame::new(vec![
            Column::new("metric".into(), metrics),
            Column::new("year".into(), years),
            Column::new("value".into(), values),
        ])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    fn strings(df: &DataFrame, name: &str) -> Vec<String> {
        df.column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect()
    }

    fn ints(df: &DataFrame, name: &str) -> Vec<i64> {
        df.column(name)
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap())
            .collect()
    }

    #[test]
    fn number_parsing_handles_separators_and_dashes() {
        assert_eq!(parse_count(" 1,234 "), Some(1234));
        assert_eq!(parse_count("12.0"), Some(12));
        assert_eq!(parse_count("-"), None);
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_number("24.5"), Some(24.5));
    }

    #[test]
    fn prosecution_splits_type_and_period() {
        let raw = table(
            &["범죄분류", "동종재범_1개월이내", "이종재범_3년초과", "비고"],
            &[&["사기", "10", "x"], &["절도", "1,200", "7"]],
        );

        let df = DataProcessor::clean_prosecution_period_type(&raw).unwrap();
        assert_eq!(df.height(), 4);
        assert_eq!(strings(&df, "crime"), vec!["사기", "절도", "사기", "절도"]);
        assert_eq!(
            strings(&df, "recid_type"),
            vec!["동종재범", "동종재범", "이종재범", "이종재범"]
        );
        assert_eq!(strings(&df, "period")[2], "3년초과");
        assert_eq!(ints(&df, "count"), vec![10, 1200, 0, 7]);
    }

    #[test]
    fn prosecution_requires_id_column() {
        let raw = table(&["crime", "동종재범_1개월이내"], &[&["a", "1"]]);
        let err = DataProcessor::clean_prosecution_period_type(&raw).unwrap_err();
        assert!(matches!(err, ProcessorError::MissingColumn { .. }));
    }

    #[test]
    fn kosis_combines_three_header_rows() {
        let raw = table(
            &["범죄별(1)", "범죄별(2)", "범죄별(3)", "2023", "2023.1", "2023.2"],
            &[
                &["", "", "", "전과없음", "전과", "전과"],
                &["", "", "", "소계", "소계", "1범"],
                &["범죄별(1)", "범죄별(2)", "범죄별(3)", "x", "x", "x"],
                &["합계", "소계", "소계", "500", "300", "-"],
            ],
        );

        let df = DataProcessor::clean_kosis_prior_convictions(&raw).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(strings(&df, "year"), vec!["2023", "2023"]);
        assert_eq!(strings(&df, "group"), vec!["전과없음", "전과"]);
        assert_eq!(strings(&df, "detail"), vec!["소계", "소계"]);
        assert_eq!(strings(&df, "crime_lvl1"), vec!["합계", "합계"]);
        assert_eq!(ints(&df, "count"), vec![500, 300]);
    }

    #[test]
    fn kosis_without_header_rows_fails() {
        let raw = table(&["범죄별(1)", "범죄별(2)", "범죄별(3)", "2023"], &[&["a", "b", "c", "1"]]);
        let err = DataProcessor::clean_kosis_prior_convictions(&raw).unwrap_err();
        assert!(matches!(err, ProcessorError::MissingHeaderRows(_)));
    }

    #[test]
    fn police_exports_melt_category_columns() {
        let raw = table(
            &["범죄대분류", "범죄중분류", "대학교", "불취학"],
            &[&["강력범죄", "살인", "3", ""]],
        );

        let edu = DataProcessor::clean_police_education(&raw).unwrap();
        let names: Vec<String> = edu.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["crime_major", "crime_minor", "education", "count"]);
        assert_eq!(strings(&edu, "education"), vec!["대학교", "불취학"]);
        assert_eq!(ints(&edu, "count"), vec![3, 0]);

        let prior = DataProcessor::clean_police_prior_record(&raw).unwrap();
        assert!(prior.column("prior_record").is_ok());
    }

    #[test]
    fn world_rates_and_followup_in_years() {
        let raw = table(
            &["Country", "Rate", "Follow-Up", "Type", "Duration"],
            &[
                &["France", "45%", "5 years", "Reimprisonment", "2010-2015"],
                &["Israel", "n/a", "6 Months", "Reconviction", "2004"],
                &["Chile", "30%", "unknown", "Reimprisonment", "2011"],
            ],
        );

        let df = DataProcessor::clean_world_recidivism(&raw).unwrap();
        let followup: Vec<Option<f64>> =
            df.column("followup_years").unwrap().f64().unwrap().into_iter().collect();
        let rate: Vec<Option<f64>> =
            df.column("rate_pct").unwrap().f64().unwrap().into_iter().collect();

        assert_eq!(followup, vec![Some(5.0), Some(0.5), None]);
        assert_eq!(rate, vec![Some(45.0), None, Some(30.0)]);
        assert_eq!(strings(&df, "period")[0], "2010-2015");
    }

    #[test]
    fn enara_finds_year_header_and_drops_notes() {
        let grid: Vec<Vec<String>> = vec![
            vec!["출소자 재복역률", "", ""],
            vec!["구분", "2019", "2020"],
            vec!["재복역기간3년이내", "24.6", "23.8"],
            vec!["인원", "1,234", "-"],
            vec!["", "1", "2"],
            vec!["출처: 법무부", "", ""],
        ]
        .into_iter()
        .map(|r| r.into_iter().map(String::from).collect())
        .collect();

        let df = DataProcessor::clean_enara_reimprisonment(grid).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(
            strings(&df, "metric"),
            vec!["재복역기간3년이내", "인원", "재복역기간3년이내"]
        );
        assert_eq!(strings(&df, "year"), vec!["2019", "2019", "2020"]);
        let values: Vec<f64> = df
            .column("value")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(values, vec![24.6, 1234.0, 23.8]);
    }

    #[test]
    fn enara_without_year_header_fails() {
        let grid = vec![vec!["a".to_string(), "2019".to_string()]];
        let err = DataProcessor::clean_enara_reimprisonment(grid).unwrap_err();
        assert!(matches!(err, ProcessorError::HeaderRowNotFound));
    }
}
