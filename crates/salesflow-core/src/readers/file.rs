use std::sync::Arc;

use async_trait::async_trait;
use salesflow_parser::{parser_for, FileFormat, FileParser, ParserError};
use tracing::{debug, info};

use super::SourceReader;
use crate::error::{PipelineError, Result};
use crate::model::{RowSet, SourceDescriptor, SourceLocation};
use crate::object_store::{ObjectStore, StagingArea};

/// Stages the object, parses it with the parser registered for `format`, and
/// drops the staged copy before returning.
async fn read_file_source(
    store: &dyn ObjectStore,
    staging: &StagingArea,
    format: FileFormat,
    source: &SourceDescriptor,
) -> Result<RowSet> {
    let source_name = source.name();
    let SourceLocation::File { bucket, key, .. } = &source.location else {
        return Err(PipelineError::UnsupportedFormat {
            source_name,
            format: format.to_string(),
        });
    };

    let staged = staging
        .stage(store, bucket, key)
        .await
        .map_err(|err| PipelineError::SourceUnavailable {
            source_name: source_name.clone(),
            detail: err.to_string(),
        })?;
    info!(
        source = %source_name,
        digest = %staged.digest,
        bytes = staged.size,
        "staged source object"
    );

    let parser = parser_for(format);
    debug!(source = %source_name, parser = parser.name(), "parsing staged object");
    let frame = parser.parse_path(&staged.path).map_err(|err| match err {
        ParserError::UnsupportedFormat(format) => PipelineError::UnsupportedFormat {
            source_name: source_name.clone(),
            format,
        },
        ParserError::Io { .. } => PipelineError::SourceUnavailable {
            source_name: source_name.clone(),
            detail: err.to_string(),
        },
        other => PipelineError::SchemaMismatch {
            source_name: source_name.clone(),
            detail: other.to_string(),
        },
    })?;
    drop(staged);

    info!(source = %source_name, rows = frame.height(), "read file source");
    debug!(source = %source_name, columns = ?frame.get_column_names_str(), "source columns");
    Ok(RowSet::new(source_name, frame))
}

macro_rules! file_reader {
    ($(#[$meta:meta])* $name:ident, $format:expr, $label:literal) => {
        $(#[$meta])*
        pub struct $name {
            store: Arc<dyn ObjectStore>,
            staging: Arc<StagingArea>,
        }

        impl $name {
            pub fn new(store: Arc<dyn ObjectStore>, staging: Arc<StagingArea>) -> Self {
                Self { store, staging }
            }
        }

        #[async_trait]
        impl SourceReader for $name {
            fn name(&self) -> &'static str {
                $label
            }

            async fn read(&self, source: &SourceDescriptor) -> Result<RowSet> {
                read_file_source(self.store.as_ref(), &self.staging, $format, source).await
            }
        }
    };
}

file_reader!(
    /// Comma-delimited text with a header row.
    DelimitedFileReader,
    FileFormat::Delimited,
    "delimited_file"
);
file_reader!(
    /// JSON array of records or newline-delimited records.
    StructuredFileReader,
    FileFormat::Structured,
    "structured_file"
);
file_reader!(
    /// First worksheet of a workbook; the header row supplies the column names.
    SpreadsheetReader,
    FileFormat::Spreadsheet,
    "spreadsheet"
);
