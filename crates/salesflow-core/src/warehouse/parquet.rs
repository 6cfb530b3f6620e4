use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::DataFrame;
use tracing::debug;
use uuid::Uuid;

use super::{Warehouse, WarehouseError};
use crate::model::{DestinationSchema, TableRef};

const ENOSPC: i32 = 28;
const EDQUOT: i32 = 122;

/// Local analytical sink: each append adds one zstd parquet part file under
/// `<root>/<table>/`. Existing parts are never touched.
#[derive(Debug, Clone)]
pub struct ParquetWarehouse {
    root: PathBuf,
    run_id: String,
}

impl ParquetWarehouse {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Names part files after the scheduler's run id.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn table_dir(&self, table: &TableRef) -> PathBuf {
        self.root.join(table.to_string())
    }

    fn part_path(&self, dir: &Path) -> PathBuf {
        let stem: String = self
            .run_id
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_') {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        let path = dir.join(format!("part-{stem}.parquet"));
        if path.exists() {
            dir.join(format!("part-{stem}-{}.parquet", Uuid::new_v4().simple()))
        } else {
            path
        }
    }
}

fn map_io_error(err: io::Error) -> WarehouseError {
    match err.raw_os_error() {
        Some(ENOSPC) | Some(EDQUOT) => WarehouseError::QuotaExceeded(err.to_string()),
        _ => WarehouseError::Unavailable(err.to_string()),
    }
}

fn parquet_bytes(rows: &DataFrame) -> Result<Vec<u8>, WarehouseError> {
    let mut buffer = Vec::new();
    let mut clone = rows.clone();
    ParquetWriter::new(&mut Cursor::new(&mut buffer))
        .with_compression(ParquetCompression::Zstd(None))
        .with_statistics(StatisticsOptions::default())
        .finish(&mut clone)
        .map_err(|err| WarehouseError::Unavailable(err.to_string()))?;
    Ok(buffer)
}

#[async_trait]
impl Warehouse for ParquetWarehouse {
    fn name(&self) -> &'static str {
        "parquet"
    }

    async fn append(
        &self,
        table: &TableRef,
        rows: &DataFrame,
        schema: &DestinationSchema,
    ) -> Result<usize, WarehouseError> {
        let names = rows.get_column_names_str();
        if names != schema.column_names() {
            return Err(WarehouseError::SchemaViolation {
                column: names.join(","),
                detail: "columns do not match the destination schema".to_string(),
            });
        }

        let bytes = parquet_bytes(rows)?;
        let dir = self.table_dir(table);
        fs::create_dir_all(&dir).map_err(map_io_error)?;

        // Readers only ever see complete part files.
        let path = self.part_path(&dir);
        let tmp = path.with_extension("parquet.tmp");
        if let Err(err) = fs::write(&tmp, &bytes).and_then(|_| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(map_io_error(err));
        }

        debug!(path = %path.display(), bytes = bytes.len(), "wrote parquet part");
        Ok(rows.height())
    }
}
