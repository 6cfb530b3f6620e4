use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::SourceReader;
use crate::db::{DatabaseClient, DatabaseError, Dialect};
use crate::error::{PipelineError, Result};
use crate::model::{RowSet, SourceDescriptor, SourceLocation};

/// Reads whole tables from one dialect family. The reader's own dialect
/// decides identifier quoting; PostgreSQL sources usually pair with
/// `ColumnPolicy::Normalize` since the server reports lower-case names.
pub struct DatabaseReader {
    dialect: Dialect,
    client: Arc<dyn DatabaseClient>,
}

impl DatabaseReader {
    pub fn new(client: Arc<dyn DatabaseClient>) -> Self {
        Self {
            dialect: client.dialect(),
            client,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

#[async_trait]
impl SourceReader for DatabaseReader {
    fn name(&self) -> &'static str {
        self.dialect.family()
    }

    async fn read(&self, source: &SourceDescriptor) -> Result<RowSet> {
        let source_name = source.name();
        let SourceLocation::Database { connection, table } = &source.location else {
            return Err(PipelineError::UnsupportedFormat {
                source_name,
                format: self.dialect.to_string(),
            });
        };

        let sql = self.dialect.select_all(table);
        debug!(source = %source_name, dialect = %self.dialect, sql = %sql, "querying source table");

        let frame = self
            .client
            .query(connection, &sql)
            .await
            .map_err(|err| match err {
                DatabaseError::Connection(_) | DatabaseError::Query(_) => {
                    PipelineError::SourceUnavailable {
                        source_name: source_name.clone(),
                        detail: err.to_string(),
                    }
                }
                other => PipelineError::SchemaMismatch {
                    source_name: source_name.clone(),
                    detail: other.to_string(),
                },
            })?;

        info!(source = %source_name, rows = frame.height(), "read database source");
        debug!(source = %source_name, columns = ?frame.get_column_names_str(), "source columns");
        Ok(RowSet::new(source_name, frame))
    }
}
