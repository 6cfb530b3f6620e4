//! Source readers: one adapter per file format and per SQL dialect family,
//! resolved from a [`SourceDescriptor`] through the [`ReaderRegistry`].

mod database;
mod file;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use salesflow_parser::FileFormat;
use tracing::debug;

use crate::db::{DatabaseClient, Dialect};
use crate::error::{PipelineError, Result};
use crate::model::{RowSet, SourceDescriptor, SourceLocation};
use crate::object_store::{ObjectStore, StagingArea};

pub use database::DatabaseReader;
pub use file::{DelimitedFileReader, SpreadsheetReader, StructuredFileReader};

#[async_trait]
pub trait SourceReader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produces the source's rows with the column names the source declares.
    async fn read(&self, source: &SourceDescriptor) -> Result<RowSet>;
}

/// Dispatch key: file sources by parsed format, database sources by dialect family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderKey {
    File(FileFormat),
    Database(Dialect),
}

impl ReaderKey {
    pub fn for_source(source: &SourceDescriptor) -> Result<Self> {
        match &source.location {
            SourceLocation::File { format, .. } => FileFormat::from_str(format)
                .map(ReaderKey::File)
                .map_err(|_| PipelineError::UnsupportedFormat {
                    source_name: source.name(),
                    format: format.clone(),
                }),
            SourceLocation::Database { connection, .. } => Dialect::from_connection_id(connection)
                .map(ReaderKey::Database)
                .ok_or_else(|| PipelineError::UnsupportedFormat {
                    source_name: source.name(),
                    format: connection_family(connection),
                }),
        }
    }
}

impl fmt::Display for ReaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderKey::File(format) => write!(f, "file:{format}"),
            ReaderKey::Database(dialect) => write!(f, "database:{dialect}"),
        }
    }
}

fn connection_family(connection: &str) -> String {
    connection
        .split(['_', '-'])
        .next()
        .unwrap_or(connection)
        .to_string()
}

#[derive(Default, Clone)]
pub struct ReaderRegistry {
    readers: HashMap<ReaderKey, Arc<dyn SourceReader>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: ReaderKey, reader: Arc<dyn SourceReader>) {
        self.readers.insert(key, reader);
    }

    /// Registers the three file readers against one object store and staging area.
    pub fn with_file_readers(
        mut self,
        store: Arc<dyn ObjectStore>,
        staging: Arc<StagingArea>,
    ) -> Self {
        self.register(
            ReaderKey::File(FileFormat::Delimited),
            Arc::new(DelimitedFileReader::new(store.clone(), staging.clone())),
        );
        self.register(
            ReaderKey::File(FileFormat::Structured),
            Arc::new(StructuredFileReader::new(store.clone(), staging.clone())),
        );
        self.register(
            ReaderKey::File(FileFormat::Spreadsheet),
            Arc::new(SpreadsheetReader::new(store, staging)),
        );
        self
    }

    /// Registers the reader for whichever dialect `client` speaks.
    pub fn with_database_client(mut self, client: Arc<dyn DatabaseClient>) -> Self {
        let reader = DatabaseReader::new(client);
        self.register(ReaderKey::Database(reader.dialect()), Arc::new(reader));
        self
    }

    pub fn contains(&self, key: &ReaderKey) -> bool {
        self.readers.contains_key(key)
    }

    pub fn resolve(&self, source: &SourceDescriptor) -> Result<Arc<dyn SourceReader>> {
        let key = ReaderKey::for_source(source)?;
        self.readers
            .get(&key)
            .cloned()
            .ok_or_else(|| PipelineError::UnsupportedFormat {
                source_name: source.name(),
                format: key.to_string(),
            })
    }

    pub async fn read(&self, source: &SourceDescriptor) -> Result<RowSet> {
        let reader = self.resolve(source)?;
        debug!(source = %source, reader = reader.name(), "resolved reader");
        reader.read(source).await
    }
}
