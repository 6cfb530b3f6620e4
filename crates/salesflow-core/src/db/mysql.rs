use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use polars::prelude::DataFrame;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

use super::{CellValue, DatabaseClient, DatabaseError, Dialect, FrameBuilder};
use crate::config::ConnectionSettings;

/// MySQL client. Opens a short-lived single-connection pool per query so a
/// daily run holds no connections between sources.
#[derive(Debug, Clone, Default)]
pub struct SqlxMySqlClient {
    connections: BTreeMap<String, ConnectionSettings>,
}

impl SqlxMySqlClient {
    pub fn new(connections: BTreeMap<String, ConnectionSettings>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl DatabaseClient for SqlxMySqlClient {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn query(&self, connection_id: &str, sql: &str) -> Result<DataFrame, DatabaseError> {
        let url = self
            .connections
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
            .resolve_url(connection_id)
            .map_err(DatabaseError::Connection)?;

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&url)
            .await
            .map_err(|err| DatabaseError::Connection(err.to_string()))?;

        let rows = sqlx::query(sql).fetch_all(&pool).await;
        pool.close().await;
        let rows = rows.map_err(query_error)?;

        let Some(first) = rows.first() else {
            return Ok(DataFrame::empty());
        };
        let names = first
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        let mut builder = FrameBuilder::new(names);
        for row in &rows {
            let cells = (0..row.len())
                .map(|idx| decode_cell(row, idx))
                .collect::<Result<Vec<_>, _>>()?;
            builder.push_row(cells)?;
        }
        builder.build()
    }
}

fn query_error(err: sqlx::Error) -> DatabaseError {
    DatabaseError::Query(err.to_string())
}

/// How a server-reported column type is read into a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decode {
    Signed,
    Unsigned,
    Bool,
    Float32,
    Float64,
    Decimal,
    Text,
    Json,
    Date,
    DateTime,
    Time,
    /// No scalar form worth keeping (binary, spatial, bit, year); read as null.
    Skip,
}

fn decode_as(type_name: &str) -> Decode {
    match type_name {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Decode::Signed,
        name if name.ends_with(" UNSIGNED") => Decode::Unsigned,
        "BOOLEAN" => Decode::Bool,
        "FLOAT" => Decode::Float32,
        "DOUBLE" => Decode::Float64,
        "DECIMAL" => Decode::Decimal,
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" => {
            Decode::Text
        }
        "JSON" => Decode::Json,
        "DATE" => Decode::Date,
        "DATETIME" | "TIMESTAMP" => Decode::DateTime,
        "TIME" => Decode::Time,
        _ => Decode::Skip,
    }
}

fn decode_cell(row: &MySqlRow, idx: usize) -> Result<CellValue, DatabaseError> {
    let raw = row.try_get_raw(idx).map_err(query_error)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }

    let column = &row.columns()[idx];
    let type_name = column.type_info().name().to_ascii_uppercase();

    let cell = match decode_as(&type_name) {
        Decode::Signed => CellValue::Int(row.try_get::<i64, _>(idx).map_err(query_error)?),
        Decode::Unsigned => {
            let value = row.try_get::<u64, _>(idx).map_err(query_error)?;
            let value = i64::try_from(value).map_err(|_| DatabaseError::UnsupportedType {
                column: column.name().to_string(),
                type_name: type_name.clone(),
            })?;
            CellValue::Int(value)
        }
        Decode::Bool => CellValue::Bool(row.try_get::<bool, _>(idx).map_err(query_error)?),
        Decode::Float32 => CellValue::Float(f64::from(
            row.try_get::<f32, _>(idx).map_err(query_error)?,
        )),
        Decode::Float64 => CellValue::Float(row.try_get::<f64, _>(idx).map_err(query_error)?),
        Decode::Decimal => {
            let value = row.try_get::<Decimal, _>(idx).map_err(query_error)?;
            match value.to_f64() {
                Some(value) => CellValue::Float(value),
                None => CellValue::Null,
            }
        }
        Decode::Text => CellValue::Text(row.try_get::<String, _>(idx).map_err(query_error)?),
        Decode::Json => CellValue::Text(
            row.try_get::<serde_json::Value, _>(idx)
                .map_err(query_error)?
                .to_string(),
        ),
        Decode::Date => CellValue::Text(
            row.try_get::<chrono::NaiveDate, _>(idx)
                .map_err(query_error)?
                .to_string(),
        ),
        Decode::DateTime => CellValue::Text(
            row.try_get::<chrono::NaiveDateTime, _>(idx)
                .map_err(query_error)?
                .to_string(),
        ),
        Decode::Time => CellValue::Text(
            row.try_get::<chrono::NaiveTime, _>(idx)
                .map_err(query_error)?
                .to_string(),
        ),
        Decode::Skip => {
            debug!(column = column.name(), type_name = %type_name, "reading column as null");
            CellValue::Null
        }
    };
    Ok(cell)
}
