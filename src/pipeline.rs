//! Pipeline stages: preprocess, tables, figures.

use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::charts::{ChartStyle, StaticChartRenderer};
use crate::config::PipelineConfig;
use crate::data::{DataLoader, DataProcessor, ProcessorError, Source, TidyFrames};
use crate::tables::TableBuilder;

/// A file produced by a stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    stage: &'a str,
    artifacts: &'a [Artifact],
}

fn write_frame(df: &DataFrame, path: &Path) -> Result<Artifact> {
    DataLoader::write_csv_bom(df, path).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), rows = df.height(), "table saved");
    Ok(Artifact {
        path: path.to_path_buf(),
        rows: Some(df.height()),
    })
}

/// Clean every raw export and write the tidy CSVs. Sources are read in parallel.
pub fn preprocess(config: &PipelineConfig) -> Result<(TidyFrames, Vec<Artifact>)> {
    let cleaned: Vec<(Source, Result<DataFrame, ProcessorError>)> = Source::ALL
        .par_iter()
        .map(|&source| (source, DataProcessor::process_source(source, &config.data_raw)))
        .collect();

    let mut frames = TidyFrames::default();
    let mut artifacts = Vec::with_capacity(cleaned.len());
    for (source, result) in cleaned {
        let df = result.with_context(|| format!("cleaning {}", source.raw_file_name()))?;
        let path = config.data_processed.join(source.tidy_file_name());
        artifacts.push(write_frame(&df, &path)?);
        frames.insert(source, df);
    }

    info!(dir = %config.data_processed.display(), "processed csv saved");
    Ok((frames, artifacts))
}

/// Load the tidy CSVs written by [`preprocess`].
pub fn load_processed(config: &PipelineConfig) -> Result<TidyFrames> {
    TidyFrames::load(&config.data_processed).with_context(|| {
        format!(
            "loading tidy tables from {} (run `preprocess` first)",
            config.data_processed.display()
        )
    })
}

pub fn make_tables(frames: &TidyFrames, config: &PipelineConfig) -> Result<Vec<Artifact>> {
    let tables = TableBuilder::build(frames).context("building summary tables")?;
    let artifacts = tables
        .entries()
        .iter()
        .map(|(file_name, df)| write_frame(df, &config.outputs.join(file_name)))
        .collect::<Result<Vec<_>>>()?;

    info!(dir = %config.outputs.display(), "outputs saved");
    Ok(artifacts)
}

pub fn make_figures(frames: &TidyFrames, config: &PipelineConfig) -> Result<Vec<Artifact>> {
    let style = ChartStyle::resolve(&config.chart);
    let dir = config.figures_dir();
    let written = StaticChartRenderer::new(&style, config.top_n)
        .render_all(frames, &dir)
        .context("rendering figures")?;

    info!(dir = %dir.display(), count = written.len(), "figures saved");
    Ok(written
        .into_iter()
        .map(|path| Artifact { path, rows: None })
        .collect())
}

/// Record what a run produced in `outputs/manifest.json`.
pub fn write_manifest(config: &PipelineConfig, stage: &str, artifacts: &[Artifact]) -> Result<PathBuf> {
    fs::create_dir_all(&config.outputs)
        .with_context(|| format!("creating {}", config.outputs.display()))?;
    let path = config.outputs.join("manifest.json");
    let json = serde_json::to_string_pretty(&Manifest { stage, artifacts })?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn config_in(root: &Path) -> PipelineConfig {
        PipelineConfig {
            data_raw: root.join("raw"),
            data_processed: root.join("processed"),
            outputs: root.join("outputs"),
            ..PipelineConfig::default()
        }
    }

    fn sample_frames() -> TidyFrames {
        TidyFrames {
            period_type: df!(
                "crime" => ["사기", "절도"],
                "recid_type" => ["동종재범", "이종재범"],
                "period" => ["1년이내", "3년초과"],
                "count" => [10i64, 4],
            )
            .unwrap(),
            kosis_prior: df!(
                "year" => ["2023", "2023"],
                "crime_lvl1" => ["합계", "합계"],
                "crime_lvl2" => ["소계", "소계"],
                "crime_lvl3" => ["소계", "소계"],
                "group" => ["전과없음", "전과"],
                "detail" => ["소계", "소계"],
                "count" => [70i64, 30],
            )
            .unwrap(),
            education: df!(
                "crime_major" => ["강력범죄"],
                "crime_minor" => ["살인"],
                "education" => ["대학교"],
                "count" => [5i64],
            )
            .unwrap(),
            prior_record: DataFrame::default(),
            world: df!(
                "country" => ["France", "Israel"],
                "followup_years" => [1.0f64, 2.0],
                "rate_pct" => [30.0f64, 40.0],
                "type" => ["Reimprisonment", "Reimprisonment"],
                "period" => ["2010", "2004"],
            )
            .unwrap(),
            e_nara: df!(
                "metric" => ["재복역기간3년이내", "출소인원"],
                "year" => ["2019", "2019"],
                "value" => [24.6f64, 100.0],
            )
            .unwrap(),
        }
    }

    #[test]
    fn tables_stage_writes_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let artifacts = make_tables(&sample_frames(), &config).unwrap();
        assert_eq!(artifacts.len(), 5);
        for artifact in &artifacts {
            assert!(artifact.path.exists(), "{} missing", artifact.path.display());
        }

        let h4 = artifacts
            .iter()
            .find(|a| a.path.ends_with("H4_country_1y_5y.csv"))
            .unwrap();
        assert_eq!(h4.rows, Some(1));
    }

    #[test]
    fn manifest_lists_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let artifacts = vec![Artifact {
            path: PathBuf::from("outputs/figures/01.png"),
            rows: None,
        }];

        let path = write_manifest(&config, "figures", &artifacts).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["stage"], "figures");
        assert_eq!(value["artifacts"][0]["path"], "outputs/figures/01.png");
        assert!(value["artifacts"][0].get("rows").is_none());
    }

    fn write_raw_exports(raw: &Path) {
        use encoding_rs::EUC_KR;
        use rust_xlsxwriter::Workbook;

        fs::create_dir_all(raw).unwrap();
        let cp949 = [
            (
                Source::ProsecutionPeriodType,
                "범죄분류,동종재범_1개월이내,이종재범_3년초과\n사기,12,3\n절도,\"1,200\",-\n",
            ),
            (
                Source::KosisPriorConvictions,
                "범죄별(1),범죄별(2),범죄별(3),2023,2023.1\n,,,전과없음,전과\n,,,소계,소계\n합계,소계,소계,500,300\n",
            ),
            (
                Source::PoliceEducation,
                "범죄대분류,범죄중분류,대학교,불취학\n강력범죄,살인,3,1\n",
            ),
            (
                Source::PolicePriorRecord,
                "범죄대분류,범죄중분류,초범,9범이상\n강력범죄,살인,4,2\n",
            ),
        ];
        for (source, text) in cp949 {
            let (bytes, _, _) = EUC_KR.encode(text);
            fs::write(raw.join(source.raw_file_name()), &*bytes).unwrap();
        }

        fs::write(
            raw.join(Source::WorldRecidivism.raw_file_name()),
            "\u{feff}Country,Rate,Follow-Up,Type,Duration\n\
             France,45%,5 years,Reimprisonment,2010\n\
             Israel,26%,6 Months,Reimprisonment,2004\n",
        )
        .unwrap();

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "출소자 3년 이내 재복역률").unwrap();
        sheet.write_string(1, 0, "구분").unwrap();
        sheet.write_number(1, 1, 2019.0).unwrap();
        sheet.write_number(1, 2, 2020.0).unwrap();
        sheet.write_string(2, 0, "재복역기간3년이내").unwrap();
        sheet.write_number(2, 1, 24.6).unwrap();
        sheet.write_number(2, 2, 23.8).unwrap();
        sheet.write_string(3, 0, "출처: 법무부").unwrap();
        workbook
            .save(raw.join(Source::ENaraReimprisonment.raw_file_name()))
            .unwrap();
    }

    #[test]
    fn preprocess_cleans_raw_exports_and_reloads_same_schema() {
        use crate::data::{f64_values, i64_values, str_values};

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        write_raw_exports(&config.data_raw);

        let (frames, artifacts) = preprocess(&config).unwrap();
        let rows: Vec<Option<usize>> = artifacts.iter().map(|a| a.rows).collect();
        assert_eq!(rows, vec![Some(4), Some(2), Some(2), Some(2), Some(2), Some(2)]);
        for source in Source::ALL {
            assert!(config.data_processed.join(source.tidy_file_name()).exists());
        }

        assert_eq!(i64_values(&frames.period_type, "count").unwrap(), vec![12, 1200, 3, 0]);
        assert_eq!(str_values(&frames.kosis_prior, "group").unwrap(), vec!["전과없음", "전과"]);
        assert_eq!(
            f64_values(&frames.world, "followup_years").unwrap(),
            vec![Some(5.0), Some(0.5)]
        );
        assert_eq!(str_values(&frames.e_nara, "year").unwrap(), vec!["2019", "2020"]);

        let reloaded = load_processed(&config).unwrap();
        for (fresh, back) in [
            (&frames.period_type, &reloaded.period_type),
            (&frames.kosis_prior, &reloaded.kosis_prior),
            (&frames.education, &reloaded.education),
            (&frames.prior_record, &reloaded.prior_record),
            (&frames.world, &reloaded.world),
            (&frames.e_nara, &reloaded.e_nara),
        ] {
            assert_eq!(fresh.schema(), back.schema());
            assert_eq!(fresh.height(), back.height());
        }
        assert_eq!(reloaded.e_nara.column("value").unwrap().dtype(), &DataType::Float64);
        assert_eq!(
            f64_values(&reloaded.e_nara, "value").unwrap(),
            vec![Some(24.6), Some(23.8)]
        );
        assert_eq!(
            str_values(&reloaded.prior_record, "prior_record").unwrap(),
            vec!["초범", "9범이상"]
        );
    }

    #[test]
    fn preprocess_reports_missing_raw_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let err = preprocess(&config).unwrap_err();
        assert!(format!("{err:#}").contains("cleaning"));
    }

    #[test]
    fn load_processed_hints_at_preprocess() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let err = load_processed(&config).unwrap_err();
        assert!(err.to_string().contains("run `preprocess` first"));
    }
}
