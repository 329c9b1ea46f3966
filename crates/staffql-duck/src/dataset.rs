//! Dataset file formats and the DuckDB table functions that read them

use std::path::Path;

use crate::EngineError;

/// DuckDB community extension reading SPSS, Stata and SAS files
pub const READ_STAT_EXTENSION: &str = "read_stat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    /// SPSS (.sav, .zsav, .por), Stata (.dta) and SAS (.sas7bdat, .xpt)
    Statistical,
    Csv,
    Parquet,
    Json,
}

impl DatasetFormat {
    /// Pick the format from the file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "sav" | "zsav" | "por" | "dta" | "sas7bdat" | "xpt" => Ok(DatasetFormat::Statistical),
            "csv" | "tsv" => Ok(DatasetFormat::Csv),
            "parquet" => Ok(DatasetFormat::Parquet),
            "json" | "ndjson" | "jsonl" => Ok(DatasetFormat::Json),
            _ => Err(EngineError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Extension that must be loaded before the reader is available
    pub fn required_extension(self) -> Option<&'static str> {
        match self {
            DatasetFormat::Statistical => Some(READ_STAT_EXTENSION),
            _ => None,
        }
    }

    /// Table function call reading `path`
    pub fn reader(self, path: &Path) -> String {
        let literal = quote_literal(&path.to_string_lossy());
        match self {
            DatasetFormat::Statistical => format!("read_stat({})", literal),
            DatasetFormat::Csv => format!("read_csv_auto({})", literal),
            DatasetFormat::Parquet => format!("read_parquet({})", literal),
            DatasetFormat::Json => format!("read_json_auto({})", literal),
        }
    }
}

/// Single-quoted SQL string literal
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Double-quoted SQL identifier
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
