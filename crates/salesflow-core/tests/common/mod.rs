#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use polars::prelude::*;
use salesflow_core::db::{DatabaseClient, DatabaseError, Dialect};
use salesflow_core::model::{DestinationSchema, TableRef};
use salesflow_core::object_store::{LocalObjectStore, StagingArea};
use salesflow_core::readers::ReaderRegistry;
use salesflow_core::warehouse::{Warehouse, WarehouseError};

/// Serves fixed frames per table and records every statement it receives.
pub struct MemoryDatabase {
    dialect: Dialect,
    tables: HashMap<String, DataFrame>,
    pub statements: Mutex<Vec<(String, String)>>,
}

impl MemoryDatabase {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tables: HashMap::new(),
            statements: Mutex::new(Vec::new()),
        }
    }

    /// Registers `frame` as the result of `SELECT * FROM <table>` in this dialect.
    pub fn with_table(mut self, table: &str, frame: DataFrame) -> Self {
        self.tables.insert(self.dialect.select_all(table), frame);
        self
    }

    pub fn statements(&self) -> Vec<(String, String)> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatabaseClient for MemoryDatabase {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn query(&self, connection_id: &str, sql: &str) -> Result<DataFrame, DatabaseError> {
        self.statements
            .lock()
            .unwrap()
            .push((connection_id.to_string(), sql.to_string()));
        self.tables
            .get(sql)
            .cloned()
            .ok_or_else(|| DatabaseError::Connection(format!("{connection_id} refused: {sql}")))
    }
}

/// Keeps every appended batch in memory.
#[derive(Default)]
pub struct RecordingWarehouse {
    pub batches: Mutex<Vec<(String, DataFrame)>>,
    pub fail_with_quota: bool,
}

impl RecordingWarehouse {
    pub fn calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn last_batch(&self) -> Option<DataFrame> {
        self.batches.lock().unwrap().last().map(|(_, df)| df.clone())
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn append(
        &self,
        table: &TableRef,
        rows: &DataFrame,
        _schema: &DestinationSchema,
    ) -> Result<usize, WarehouseError> {
        if self.fail_with_quota {
            return Err(WarehouseError::QuotaExceeded("daily insert quota".into()));
        }
        self.batches
            .lock()
            .unwrap()
            .push((table.to_string(), rows.clone()));
        Ok(rows.height())
    }
}

pub fn sales_frame(
    ids: &[i64],
    countries: &[&str],
    qty: &[Option<i64>],
    price: &[f64],
    amount: &[f64],
) -> DataFrame {
    let n = ids.len();
    DataFrame::new(vec![
        Series::new("SaleId".into(), ids).into(),
        Series::new("Country".into(), countries).into(),
        Series::new("Category".into(), vec!["A"; n]).into(),
        Series::new("Product".into(), vec!["P"; n]).into(),
        Series::new("Qty".into(), qty).into(),
        Series::new("Price".into(), price).into(),
        Series::new("Amount".into(), amount).into(),
    ])
    .unwrap()
}

pub fn put_object(root: &Path, bucket: &str, key: &str, contents: &[u8]) {
    let path = root.join(bucket).join(key);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

pub fn parser_fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../salesflow-parser/tests/data")
        .join(name);
    std::fs::read(path).expect("read fixture")
}

/// Registry over a local object store rooted at `root` plus the given clients.
pub fn registry(root: &Path, clients: Vec<Arc<dyn DatabaseClient>>) -> ReaderRegistry {
    let staging = Arc::new(StagingArea::new(None).unwrap());
    let mut registry =
        ReaderRegistry::new().with_file_readers(Arc::new(LocalObjectStore::new(root)), staging);
    for client in clients {
        registry = registry.with_database_client(client);
    }
    registry
}
