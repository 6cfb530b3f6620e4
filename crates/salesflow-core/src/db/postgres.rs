use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use polars::prelude::DataFrame;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

use super::{CellValue, DatabaseClient, DatabaseError, Dialect, FrameBuilder};
use crate::config::ConnectionSettings;

#[derive(Debug, Clone, Default)]
pub struct SqlxPostgresClient {
    connections: BTreeMap<String, ConnectionSettings>,
}

impl SqlxPostgresClient {
    pub fn new(connections: BTreeMap<String, ConnectionSettings>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl DatabaseClient for SqlxPostgresClient {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn query(&self, connection_id: &str, sql: &str) -> Result<DataFrame, DatabaseError> {
        let url = self
            .connections
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
            .resolve_url(connection_id)
            .map_err(DatabaseError::Connection)?;

        let pool = PgPoolOptions::new()
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
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Numeric,
    Bool,
    Text,
    Uuid,
    Json,
    Date,
    Timestamp,
    TimestampTz,
    Time,
    /// Arrays, ranges, bytea and the like; read as null.
    Skip,
}

fn decode_as(type_name: &str) -> Decode {
    match type_name {
        "INT2" => Decode::Int16,
        "INT4" => Decode::Int32,
        "INT8" => Decode::Int64,
        "FLOAT4" => Decode::Float32,
        "FLOAT8" => Decode::Float64,
        "NUMERIC" => Decode::Numeric,
        "BOOL" => Decode::Bool,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Decode::Text,
        "UUID" => Decode::Uuid,
        "JSON" | "JSONB" => Decode::Json,
        "DATE" => Decode::Date,
        "TIMESTAMP" => Decode::Timestamp,
        "TIMESTAMPTZ" => Decode::TimestampTz,
        "TIME" => Decode::Time,
        _ => Decode::Skip,
    }
}

fn decode_cell(row: &PgRow, idx: usize) -> Result<CellValue, DatabaseError> {
    let raw = row.try_get_raw(idx).map_err(query_error)?;
    if raw.is_null() {
        return Ok(CellValue::Null);
    }

    let column = &row.columns()[idx];
    let type_name = column.type_info().name().to_ascii_uppercase();

    let cell = match decode_as(&type_name) {
        Decode::Int16 => CellValue::Int(i64::from(
            row.try_get::<i16, _>(idx).map_err(query_error)?,
        )),
        Decode::Int32 => CellValue::Int(i64::from(
            row.try_get::<i32, _>(idx).map_err(query_error)?,
        )),
        Decode::Int64 => CellValue::Int(row.try_get::<i64, _>(idx).map_err(query_error)?),
        Decode::Float32 => CellValue::Float(f64::from(
            row.try_get::<f32, _>(idx).map_err(query_error)?,
        )),
        Decode::Float64 => CellValue::Float(row.try_get::<f64, _>(idx).map_err(query_error)?),
        Decode::Numeric => {
            let value = row.try_get::<Decimal, _>(idx).map_err(query_error)?;
            match value.to_f64() {
                Some(value) => CellValue::Float(value),
                None => CellValue::Null,
            }
        }
        Decode::Bool => CellValue::Bool(row.try_get::<bool, _>(idx).map_err(query_error)?),
        Decode::Text => CellValue::Text(row.try_get::<String, _>(idx).map_err(query_error)?),
        Decode::Uuid => CellValue::Text(
            row.try_get::<uuid::Uuid, _>(idx)
                .map_err(query_error)?
                .to_string(),
        ),
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
        Decode::Timestamp => CellValue::Text(
            row.try_get::<chrono::NaiveDateTime, _>(idx)
                .map_err(query_error)?
                .to_string(),
        ),
        Decode::TimestampTz => CellValue::Text(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
                .map_err(query_error)?
                .to_rfc3339(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sales_columns_keep_their_types() {
        assert_eq!(decode_as("INT4"), Decode::Int32);
        assert_eq!(decode_as("NUMERIC"), Decode::Numeric);
        assert_eq!(decode_as("BPCHAR"), Decode::Text);
    }

    #[test]
    fn extra_columns_are_readable() {
        assert_eq!(decode_as("TIMESTAMPTZ"), Decode::TimestampTz);
        assert_eq!(decode_as("TIMESTAMP"), Decode::Timestamp);
        assert_eq!(decode_as("UUID"), Decode::Uuid);
        assert_eq!(decode_as("JSONB"), Decode::Json);
    }

    #[test]
    fn unknown_types_do_not_fail_the_source() {
        assert_eq!(decode_as("BYTEA"), Decode::Skip);
        assert_eq!(decode_as("INT4[]"), Decode::Skip);
        assert_eq!(decode_as("TSTZRANGE"), Decode::Skip);
    }
}
