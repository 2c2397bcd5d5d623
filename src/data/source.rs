//! Source Registry
//! The six statistical exports the pipeline knows how to read.

use std::fmt;

/// On-disk format of a raw export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFormat {
    /// Korean government CSV exports (code page 949).
    Cp949Csv,
    /// UTF-8 CSV, optionally with a BOM.
    Utf8Csv,
    /// Excel workbook; only the first sheet is read.
    Xlsx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    ProsecutionPeriodType,
    KosisPriorConvictions,
    PoliceEducation,
    PolicePriorRecord,
    WorldRecidivism,
    ENaraReimprisonment,
}

impl Source {
    pub const ALL: [Source; 6] = [
        Source::ProsecutionPeriodType,
        Source::KosisPriorConvictions,
        Source::PoliceEducation,
        Source::PolicePriorRecord,
        Source::WorldRecidivism,
        Source::ENaraReimprisonment,
    ];

    /// File stem shared by the raw export and its tidy output.
    pub fn stem(self) -> &'static str {
        match self {
            Source::ProsecutionPeriodType => "prosecution_reoffend_period_type_2017",
            Source::KosisPriorConvictions => "kosis_prior_convictions_2023",
            Source::PoliceEducation => "police_education_2020",
            Source::PolicePriorRecord => "police_prior_record_2020",
            Source::WorldRecidivism => "world_recidivism_rates",
            Source::ENaraReimprisonment => "e_nara_3yr_reimprisonment",
        }
    }

    pub fn format(self) -> RawFormat {
        match self {
            Source::WorldRecidivism => RawFormat::Utf8Csv,
            Source::ENaraReimprisonment => RawFormat::Xlsx,
            _ => RawFormat::Cp949Csv,
        }
    }

    pub fn raw_file_name(self) -> String {
        let ext = match self.format() {
            RawFormat::Xlsx => "xlsx",
            RawFormat::Cp949Csv | RawFormat::Utf8Csv => "csv",
        };
        format!("{}.{}", self.stem(), ext)
    }

    pub fn tidy_file_name(self) -> String {
        format!("{}_tidy.csv", self.stem())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}
