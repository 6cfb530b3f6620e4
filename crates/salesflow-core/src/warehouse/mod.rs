//! Append-only destination for the normalized dataset.

mod loader;
mod parquet;
mod postgres;

use async_trait::async_trait;
use polars::prelude::DataFrame;
use thiserror::Error;

use crate::error::PipelineError;
use crate::model::{DestinationSchema, TableRef};

pub use loader::{load, prepare_batch, LoadReceipt};
pub use parquet::ParquetWarehouse;
pub use postgres::PostgresWarehouse;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("schema violation on {column}: {detail}")]
    SchemaViolation { column: String, detail: String },
    #[error("warehouse unavailable: {0}")]
    Unavailable(String),
}

impl From<WarehouseError> for PipelineError {
    fn from(err: WarehouseError) -> Self {
        match err {
            WarehouseError::QuotaExceeded(detail) => PipelineError::QuotaExceeded(detail),
            WarehouseError::SchemaViolation { column, detail } => {
                PipelineError::SchemaViolation { column, detail }
            }
            WarehouseError::Unavailable(detail) => PipelineError::WarehouseUnavailable(detail),
        }
    }
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    fn name(&self) -> &'static str;

    /// Appends every row of `rows` to `table` as one batch. Either all rows
    /// land or none do. Returns the number of rows written.
    async fn append(
        &self,
        table: &TableRef,
        rows: &DataFrame,
        schema: &DestinationSchema,
    ) -> Result<usize, WarehouseError>;
}
