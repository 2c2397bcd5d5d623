//! Data Loader Module
//! Reads raw government exports (cp949 CSV, UTF-8 CSV, Excel) into an untyped
//! grid and moves tidy tables to and from disk using Polars.

use calamine::{open_workbook, Data, Reader, Xlsx, XlsxError};
use encoding_rs::{Encoding, EUC_KR, UTF_8};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use thiserror::Error;

use super::source::RawFormat;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to open Excel file: {0}")]
    Excel(#[from] XlsxError),
    #[error("No worksheet found in {0}")]
    NoWorksheet(String),
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// Untyped table as it appears in the export: one header row plus string cells.
///
/// Every row has exactly `headers.len()` cells; missing cells are empty strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// Build a table whose first row is the header. Used for headerless grids
    /// such as Excel sheets.
    pub fn from_grid(mut grid: Vec<Vec<String>>) -> Self {
        if grid.is_empty() {
            return Self::default();
        }
        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        let mut headers = grid.remove(0);
        headers.resize(width, String::new());
        Self::new(headers, grid)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }
}

/// Handles reading raw exports and tidy CSVs.
pub struct DataLoader;

impl DataLoader {
    /// Read a raw CSV export, decoding it according to `format`.
    pub fn read_csv(path: &Path, format: RawFormat) -> Result<RawTable, LoaderError> {
        let bytes = fs::read(path).map_err(|source| LoaderError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let encoding: &'static Encoding = match format {
            RawFormat::Cp949Csv => EUC_KR,
            _ => UTF_8,
        };
        Self::parse_csv_bytes(&bytes, encoding)
    }

    /// Decode and parse CSV bytes. A leading BOM is removed by the decoder.
    pub fn parse_csv_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<RawTable, LoaderError> {
        let (text, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            tracing::warn!(encoding = encoding.name(), "input contained undecodable bytes");
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(RawTable::new(headers, rows))
    }

    /// Read every row of the first worksheet. No row is treated as a header.
    pub fn read_excel_first_sheet(path: &Path) -> Result<Vec<Vec<String>>, LoaderError> {
        let mut workbook: Xlsx<_> = open_workbook(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| LoaderError::NoWorksheet(path.display().to_string()))??;

        Ok(range
            .rows()
            .map(|row| row.iter().map(Self::cell_to_string).collect())
            .collect())
    }

    fn cell_to_string(cell: &Data) -> String {
        match cell {
            Data::Empty => String::new(),
            Data::String(s) => s.trim().to_string(),
            // Year headers are stored as floats; render 2019.0 as "2019"
            Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
            other => other.to_string(),
        }
    }

    /// Load a tidy CSV with every column as String; callers cast what they need.
    pub fn load_tidy(path: &Path) -> Result<DataFrame, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            });
        }

        let df = LazyCsvReader::new(path)
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .finish()?
            .collect()?;
        Ok(df)
    }

    /// Write a frame as UTF-8 CSV with BOM, creating parent directories.
    pub fn write_csv_bom(df: &DataFrame, path: &Path) -> Result<(), LoaderError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LoaderError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let mut file = File::create(path).map_err(|source| LoaderError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut df = df.clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .include_bom(true)
            .finish(&mut df)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cp949_export() {
        let text = "범죄분류,동종재범_1개월이내\n사기,12\n절도,3\n";
        let (bytes, _, _) = EUC_KR.encode(text);

        let table = DataLoader::parse_csv_bytes(&bytes, EUC_KR).unwrap();
        assert_eq!(table.headers, vec!["범죄분류", "동종재범_1개월이내"]);
        assert_eq!(table.height(), 2);
        assert_eq!(table.rows[0], vec!["사기", "12"]);
        assert_eq!(table.column_index("동종재범_1개월이내"), Some(1));
    }

    #[test]
    fn strips_utf8_bom_and_pads_short_rows() {
        let bytes = "\u{feff}Country,Rate,Type\nFrance,45%\n".as_bytes();

        let table = DataLoader::parse_csv_bytes(bytes, UTF_8).unwrap();
        assert_eq!(table.headers[0], "Country");
        assert_eq!(table.rows[0], vec!["France", "45%", ""]);
    }

    #[test]
    fn from_grid_uses_first_row_as_header() {
        let grid = vec![
            vec!["a".to_string()],
            vec!["1".to_string(), "2".to_string()],
        ];
        let table = RawTable::from_grid(grid);
        assert_eq!(table.headers, vec!["a", ""]);
        assert_eq!(table.rows, vec![vec!["1", "2"]]);
        assert_eq!(RawTable::from_grid(Vec::new()), RawTable::default());
    }

    #[test]
    fn float_cells_render_without_fraction() {
        assert_eq!(DataLoader::cell_to_string(&Data::Float(2019.0)), "2019");
        assert_eq!(DataLoader::cell_to_string(&Data::Float(24.5)), "24.5");
        assert_eq!(DataLoader::cell_to_string(&Data::Empty), "");
    }

    #[test]
    fn tidy_csv_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.csv");

        let df = DataFrame::new(vec![
            Column::new("crime".into(), vec!["사기", "절도"]),
            Column::new("count".into(), vec![3i64, 4]),
        ])
        .unwrap();
        DataLoader::write_csv_bom(&df, &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));

        let back = DataLoader::load_tidy(&path).unwrap();
        assert_eq!(back.height(), 2);
        assert_eq!(back.column("crime").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn missing_tidy_file_is_io_error() {
        let err = DataLoader::load_tidy(Path::new("/nonexistent/x.csv")).unwrap_err();
        assert!(matches!(err, LoaderError::Io { .. }));
    }
}
