//! Pipeline Configuration Module
//! Directory layout, chart sizing and font preferences.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Chart output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChartConfig {
    /// Font families tried in order; the first installed one wins.
    pub preferred_fonts: Vec<String>,
    pub width: u32,
    pub height: u32,
    /// Height used by the charts with long category axes.
    pub tall_height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            // Windows, macOS, then the usual Linux CJK packages
            preferred_fonts: vec![
                "Malgun Gothic".to_string(),
                "AppleGothic".to_string(),
                "NanumGothic".to_string(),
                "Noto Sans CJK KR".to_string(),
                "Noto Sans KR".to_string(),
            ],
            width: 1800,
            height: 1000,
            tall_height: 1200,
        }
    }
}

/// Top-level configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub data_raw: PathBuf,
    pub data_processed: PathBuf,
    pub outputs: PathBuf,
    /// Number of crime types in the top-crimes chart.
    pub top_n: usize,
    pub log_level: String,
    pub chart: ChartConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_raw: PathBuf::from("data/raw"),
            data_processed: PathBuf::from("data/processed"),
            outputs: PathBuf::from("outputs"),
            top_n: 12,
            log_level: "info".to_string(),
            chart: ChartConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Build the configuration: defaults, then the optional JSON file, then
    /// `RECID_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RECID_DATA_RAW") {
            self.data_raw = PathBuf::from(v);
        }
        if let Some(v) = lookup("RECID_DATA_PROCESSED") {
            self.data_processed = PathBuf::from(v);
        }
        if let Some(v) = lookup("RECID_OUTPUTS") {
            self.outputs = PathBuf::from(v);
        }
        if let Some(v) = lookup("RECID_LOG_LEVEL") {
            self.log_level = v;
        }
    }

    pub fn figures_dir(&self) -> PathBuf {
        self.outputs.join("figures")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_project_layout() {
        let config = PipelineConfig::default();
        assert_eq!(config.data_raw, PathBuf::from("data/raw"));
        assert_eq!(config.figures_dir(), PathBuf::from("outputs/figures"));
        assert_eq!(config.top_n, 12);
        assert_eq!(config.chart.preferred_fonts[0], "Malgun Gothic");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        fs::write(&path, r#"{ "top_n": 5, "chart": { "width": 900 } }"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.top_n, 5);
        assert_eq!(config.chart.width, 900);
        assert_eq!(config.chart.height, 1000);
        assert_eq!(config.outputs, PathBuf::from("outputs"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        fs::write(&path, r#"{ "topn": 5 }"#).unwrap();

        let err = PipelineConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_paths() {
        let vars: HashMap<&str, &str> = [
            ("RECID_OUTPUTS", "/tmp/out"),
            ("RECID_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.outputs, PathBuf::from("/tmp/out"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.data_raw, PathBuf::from("data/raw"));
    }
}
