use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("unsupported file format '{0}'")]
    UnsupportedFormat(String),

    #[error("{parser} could not open {}: {source}", path.display())]
    Io {
        parser: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{parser} failed to read {}: {source}", path.display())]
    Polars {
        parser: &'static str,
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("{parser} workbook error in {}: {source}", path.display())]
    Workbook {
        parser: &'static str,
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("{parser} header invalid: {message}")]
    InvalidHeader {
        parser: &'static str,
        message: String,
    },

    #[error("{parser} file {} did not contain a header row", path.display())]
    EmptyData {
        parser: &'static str,
        path: PathBuf,
    },
}
