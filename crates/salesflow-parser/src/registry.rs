use std::fmt;
use std::path::Path;
use std::str::FromStr;

use polars::prelude::DataFrame;

use crate::errors::ParserError;
use crate::formats::{DelimitedParser, SpreadsheetParser, StructuredParser};

/// File layouts a staged object can be parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// Comma-delimited text with a header row.
    Delimited,
    /// JSON array of records, or newline-delimited records.
    Structured,
    /// First worksheet of an xlsx/xls/ods workbook.
    Spreadsheet,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Delimited => "csv",
            FileFormat::Structured => "json",
            FileFormat::Spreadsheet => "xlsx",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = ParserError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" | "delimited" => Ok(FileFormat::Delimited),
            "json" | "ndjson" | "jsonl" | "structured" => Ok(FileFormat::Structured),
            "xlsx" | "xls" | "xlsm" | "ods" | "spreadsheet" => Ok(FileFormat::Spreadsheet),
            other => Err(ParserError::UnsupportedFormat(other.to_string())),
        }
    }
}

pub trait FileParser: Send + Sync {
    fn name(&self) -> &'static str;
    fn format(&self) -> FileFormat;
    fn parse_path(&self, path: &Path) -> Result<DataFrame, ParserError>;
}

static DELIMITED: DelimitedParser = DelimitedParser;
static STRUCTURED: StructuredParser = StructuredParser;
static SPREADSHEET: SpreadsheetParser = SpreadsheetParser;

pub fn parser_for(format: FileFormat) -> &'static dyn FileParser {
    match format {
        FileFormat::Delimited => &DELIMITED,
        FileFormat::Structured => &STRUCTURED,
        FileFormat::Spreadsheet => &SPREADSHEET,
    }
}

/// Parses a local file with the parser registered for `format`. Column names are
/// returned exactly as the file declares them.
pub fn parse_file(format: FileFormat, path: &Path) -> Result<DataFrame, ParserError> {
    parser_for(format).parse_path(path)
}
