use std::path::Path;

use polars::prelude::*;

use crate::errors::ParserError;
use crate::registry::{FileFormat, FileParser};

const INFER_SCHEMA_ROWS: usize = 1_000;

#[derive(Debug, Default, Clone, Copy)]
pub struct DelimitedParser;

impl DelimitedParser {
    const NAME: &'static str = "DELIMITED";
}

impl FileParser for DelimitedParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn format(&self) -> FileFormat {
        FileFormat::Delimited
    }

    fn parse_path(&self, path: &Path) -> Result<DataFrame, ParserError> {
        if !path.is_file() {
            return Err(ParserError::Io {
                parser: Self::NAME,
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "staged file missing"),
            });
        }

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .and_then(|reader| reader.finish())
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
