//! Database client seam. Each dialect family gets one client; the source
//! readers only ever call [`DatabaseClient::query`].

mod frame;
#[cfg(feature = "runtime")]
mod mssql;
mod mysql;
mod postgres;

use std::fmt;

use async_trait::async_trait;
use polars::prelude::{DataFrame, PolarsError};
use thiserror::Error;

pub use frame::{CellValue, FrameBuilder};
#[cfg(feature = "runtime")]
pub use mssql::TiberiusClient;
pub use mysql::SqlxMySqlClient;
pub use postgres::SqlxPostgresClient;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("column {column} has unsupported type {type_name}")]
    UnsupportedType { column: String, type_name: String },
    #[error("row has {found} values, expected {expected}")]
    RowWidth { expected: usize, found: usize },
    #[error("failed to assemble result frame: {0}")]
    Frame(#[from] PolarsError),
}

/// SQL dialect families, selected from the prefix of a connection id
/// (`mysql_oman`, `postgres_norway`, `mssql_india`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    Postgres,
    MsSql,
}

impl Dialect {
    pub fn from_connection_id(connection_id: &str) -> Option<Self> {
        let lower = connection_id.trim().to_ascii_lowercase();
        if lower.starts_with("mysql") {
            Some(Dialect::MySql)
        } else if lower.starts_with("postgres") {
            Some(Dialect::Postgres)
        } else if lower.starts_with("mssql") {
            Some(Dialect::MsSql)
        } else {
            None
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::MsSql => "mssql",
        }
    }

    /// PostgreSQL folds unquoted names to lower case, so its identifiers are
    /// always quoted. The other dialects take validated identifiers bare.
    pub fn quote_table(&self, table: &str) -> String {
        match self {
            Dialect::Postgres => table
                .split('.')
                .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
                .collect::<Vec<_>>()
                .join("."),
            Dialect::MySql | Dialect::MsSql => table.to_string(),
        }
    }

    pub fn select_all(&self, table: &str) -> String {
        format!("SELECT * FROM {}", self.quote_table(table))
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.family())
    }
}

#[async_trait]
pub trait DatabaseClient: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Runs `sql` on the named connection and returns the full result set with
    /// the column names the server reported.
    async fn query(&self, connection_id: &str, sql: &str) -> Result<DataFrame, DatabaseError>;
}
