use std::io::Cursor;
use std::path::Path;

use polars::io::json::{JsonFormat, JsonReader};
use polars::prelude::*;
use serde_json::{Map, Value};

use crate::errors::ParserError;
use crate::registry::{FileFormat, FileParser};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Reads structured-record files in any of three layouts:
/// a JSON array of records, one record per line, or a single object mapping
/// each column to an `{index: value}` object (the pandas default).
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredParser;

#[derive(Debug)]
enum Layout {
    Records,
    Lines,
    Columns(Map<String, Value>),
}

impl StructuredParser {
    const NAME: &'static str = "STRUCTURED";

    fn detect_layout(path: &Path, bytes: &[u8]) -> Result<Layout, ParserError> {
        let first = bytes.iter().copied().find(|b| !b.is_ascii_whitespace());

        match first {
            Some(b'[') => Ok(Layout::Records),
            Some(b'{') => match serde_json::from_slice::<Value>(bytes) {
                Ok(Value::Object(columns))
                    if !columns.is_empty() && columns.values().all(Value::is_object) =>
                {
                    Ok(Layout::Columns(columns))
                }
                _ => Ok(Layout::Lines),
            },
            Some(other) => Err(ParserError::InvalidHeader {
                parser: Self::NAME,
                message: format!(
                    "expected a JSON array or object records, found '{}'",
                    other as char
                ),
            }),
            None => Err(ParserError::EmptyData {
                parser: Self::NAME,
                path: path.to_path_buf(),
            }),
        }
    }

    /// Pivots `{column: {index: value}}` into an array of records. Row order
    /// follows the indices as they first appear; a column missing an index
    /// contributes a null.
    fn columns_to_records(columns: Map<String, Value>) -> Result<Vec<u8>, ParserError> {
        let mut index: Vec<String> = Vec::new();
        for values in columns.values() {
            if let Value::Object(values) = values {
                for key in values.keys() {
                    if !index.contains(key) {
                        index.push(key.clone());
                    }
                }
            }
        }

        let records: Vec<Value> = index
            .iter()
            .map(|row| {
                let record: Map<String, Value> = columns
                    .iter()
                    .map(|(name, values)| {
                        let value = values.get(row).cloned().unwrap_or(Value::Null);
                        (name.clone(), value)
                    })
                    .collect();
                Value::Object(record)
            })
            .collect();

        serde_json::to_vec(&records).map_err(|err| ParserError::InvalidHeader {
            parser: Self::NAME,
            message: err.to_string(),
        })
    }
}

impl FileParser for StructuredParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn format(&self) -> FileFormat {
        FileFormat::Structured
    }

    fn parse_path(&self, path: &Path) -> Result<DataFrame, ParserError> {
        let mut bytes = std::fs::read(path).map_err(|source| ParserError::Io {
            parser: Self::NAME,
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.starts_with(UTF8_BOM) {
            bytes.drain(..UTF8_BOM.len());
        }

        let (bytes, format) = match Self::detect_layout(path, &bytes)? {
            Layout::Records => (bytes, JsonFormat::Json),
            Layout::Lines => (bytes, JsonFormat::JsonLines),
            Layout::Columns(columns) => (Self::columns_to_records(columns)?, JsonFormat::Json),
        };

        let df = JsonReader::new(Cursor::new(bytes))
            .with_json_format(format)
            .finish()
            .map_err(|source| ParserError::Polars {
                parser: Self::NAME,
                path: path.to_path_buf(),
                source,
            })?;

        if df.width() == 0 {
            return Err(ParserError::EmptyData {
                parser: Self::NAME,
                path: path.to_path_buf(),
            });
        }

        Ok(df)
    }
}
