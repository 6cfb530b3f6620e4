use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use polars::prelude::DataFrame;
use tiberius::{Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::debug;

use super::{CellValue, DatabaseClient, DatabaseError, Dialect, FrameBuilder};
use crate::config::ConnectionSettings;

/// SQL Server client over TDS. Connection URLs are ADO.NET strings, e.g.
/// `server=tcp:host,1433;user=etl;password=...;TrustServerCertificate=true`.
#[derive(Debug, Clone, Default)]
pub struct TiberiusClient {
    connections: BTreeMap<String, ConnectionSettings>,
}

impl TiberiusClient {
    pub fn new(connections: BTreeMap<String, ConnectionSettings>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl DatabaseClient for TiberiusClient {
    fn dialect(&self) -> Dialect {
        Dialect::MsSql
    }

    async fn query(&self, connection_id: &str, sql: &str) -> Result<DataFrame, DatabaseError> {
        let url = self
            .connections
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
            .resolve_url(connection_id)
            .map_err(DatabaseError::Connection)?;

        let config = Config::from_ado_string(&url)
            .map_err(|err| DatabaseError::Connection(err.to_string()))?;
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|err| DatabaseError::Connection(err.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|err| DatabaseError::Connection(err.to_string()))?;
        let mut client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|err| DatabaseError::Connection(err.to_string()))?;

        let rows = client
            .simple_query(sql)
            .await
            .map_err(query_error)?
            .into_first_result()
            .await
            .map_err(query_error)?;

        let Some(first) = rows.first() else {
            return Ok(DataFrame::empty());
        };
        let names: Vec<String> = first
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        let mut builder = FrameBuilder::new(names.clone());
        for row in rows {
            let cells = row
                .into_iter()
                .enumerate()
                .map(|(idx, data)| {
                    let column = names.get(idx).map(String::as_str).unwrap_or("?");
                    decode_cell(column, data)
                })
                .collect::<Result<Vec<_>, _>>()?;
            builder.push_row(cells)?;
        }
        builder.build()
    }
}

fn query_error(err: tiberius::error::Error) -> DatabaseError {
    DatabaseError::Query(err.to_string())
}

fn decode_cell(column: &str, data: ColumnData<'static>) -> Result<CellValue, DatabaseError> {
    let cell = match &data {
        ColumnData::U8(value) => value.map(|v| CellValue::Int(i64::from(v))),
        ColumnData::I16(value) => value.map(|v| CellValue::Int(i64::from(v))),
        ColumnData::I32(value) => value.map(|v| CellValue::Int(i64::from(v))),
        ColumnData::I64(value) => value.map(CellValue::Int),
        ColumnData::F32(value) => value.map(|v| CellValue::Float(f64::from(v))),
        ColumnData::F64(value) => value.map(CellValue::Float),
        ColumnData::Numeric(value) => value.map(|v| CellValue::Float(f64::from(v))),
        ColumnData::Bit(value) => value.map(CellValue::Bool),
        ColumnData::String(value) => value.as_ref().map(|v| CellValue::Text(v.to_string())),
        ColumnData::Guid(value) => value.map(|v| CellValue::Text(v.to_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(column, &data)?
        }
        ColumnData::Date(_) => temporal::<NaiveDate>(column, &data)?,
        ColumnData::Time(_) => temporal::<NaiveTime>(column, &data)?,
        ColumnData::DateTimeOffset(_) => temporal::<DateTime<Utc>>(column, &data)?,
        _ => {
            debug!(column, "no scalar form for column, reading as null");
            None
        }
    };
    Ok(cell.unwrap_or(CellValue::Null))
}

/// Temporal values travel as text; the reconciler casts them if a canonical
/// column ever needs them.
fn temporal<'a, T>(column: &str, data: &'a ColumnData<'static>) -> Result<Option<CellValue>, DatabaseError>
where
    T: FromSql<'a> + ToString,
{
    T::from_sql(data)
        .map(|value| value.map(|v| CellValue::Text(v.to_string())))
        .map_err(|err| DatabaseError::UnsupportedType {
            column: column.to_string(),
            type_name: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use tiberius::time::{Date, DateTime as TdsDateTime};

    use super::*;

    #[test]
    fn scalar_columns_decode() {
        assert_eq!(
            decode_cell("SaleId", ColumnData::I32(Some(7))).unwrap(),
            CellValue::Int(7)
        );
        assert_eq!(
            decode_cell("Country", ColumnData::String(Some(Cow::Borrowed("India")))).unwrap(),
            CellValue::Text("India".to_string())
        );
        assert_eq!(decode_cell("Qty", ColumnData::I64(None)).unwrap(), CellValue::Null);
    }

    #[test]
    fn extra_temporal_columns_read_as_text() {
        let sale_date = decode_cell(
            "SaleDate",
            ColumnData::DateTime(Some(TdsDateTime::new(45000, 0))),
        )
        .unwrap();
        match sale_date {
            CellValue::Text(value) => assert!(value.starts_with("2023-03-"), "{value}"),
            other => panic!("unexpected cell: {other:?}"),
        }

        let day = decode_cell("Day", ColumnData::Date(Some(Date::new(0)))).unwrap();
        assert_eq!(day, CellValue::Text("0001-01-01".to_string()));
        assert_eq!(
            decode_cell("Day", ColumnData::Date(None)).unwrap(),
            CellValue::Null
        );
    }

    #[test]
    fn binary_columns_read_as_null() {
        let cell = decode_cell("Thumbnail", ColumnData::Binary(Some(Cow::Owned(vec![1, 2])))).unwrap();
        assert_eq!(cell, CellValue::Null);
    }
}
