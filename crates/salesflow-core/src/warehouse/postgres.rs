use std::time::Duration;

use async_trait::async_trait;
use polars::prelude::*;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::debug;

use super::{Warehouse, WarehouseError};
use crate::db::Dialect;
use crate::model::{DestinationSchema, FieldType, TableRef};

/// Rows per INSERT statement; eight binds per row keeps well under the
/// 65535 parameter limit.
const INSERT_CHUNK_ROWS: usize = 1_000;

/// Appends into a PostgreSQL table, creating it from the destination schema
/// on first use. Each batch is one transaction.
#[derive(Clone)]
pub struct PostgresWarehouse {
    pool: PgPool,
}

impl PostgresWarehouse {
    pub async fn connect(database_url: &str) -> Result<Self, WarehouseError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|err| WarehouseError::Unavailable(err.to_string()))?;
        Ok(Self { pool })
    }
}

fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Integer => "BIGINT",
        FieldType::String => "TEXT",
        FieldType::Float => "DOUBLE PRECISION",
    }
}

fn quoted(name: &str) -> String {
    Dialect::Postgres.quote_table(name)
}

pub(crate) fn create_table_sql(table: &TableRef, schema: &DestinationSchema) -> String {
    let columns = schema
        .fields()
        .iter()
        .map(|field| {
            format!(
                "{} {} NOT NULL",
                quoted(field.name),
                column_type(field.field_type)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({columns})",
        quoted(&table.to_string())
    )
}

fn map_sqlx_error(err: sqlx::Error) -> WarehouseError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|code| code.into_owned()).unwrap_or_default();
            if code.starts_with("53") || code == "54000" {
                WarehouseError::QuotaExceeded(db_err.message().to_string())
            } else if code.starts_with("22") || code.starts_with("42") {
                WarehouseError::SchemaViolation {
                    column: db_err.constraint().unwrap_or("<table>").to_string(),
                    detail: db_err.message().to_string(),
                }
            } else {
                WarehouseError::Unavailable(err.to_string())
            }
        }
        _ => WarehouseError::Unavailable(err.to_string()),
    }
}

enum BoundColumn<'a> {
    Integer(&'a Int64Chunked),
    String(&'a StringChunked),
    Float(&'a Float64Chunked),
}

fn bound_columns<'a>(
    rows: &'a DataFrame,
    schema: &DestinationSchema,
) -> Result<Vec<BoundColumn<'a>>, WarehouseError> {
    schema
        .fields()
        .iter()
        .map(|field| {
            let violation = |err: PolarsError| WarehouseError::SchemaViolation {
                column: field.name.to_string(),
                detail: err.to_string(),
            };
            let column = rows.column(field.name).map_err(violation)?;
            Ok(match field.field_type {
                FieldType::Integer => BoundColumn::Integer(column.i64().map_err(violation)?),
                FieldType::String => BoundColumn::String(column.str().map_err(violation)?),
                FieldType::Float => BoundColumn::Float(column.f64().map_err(violation)?),
            })
        })
        .collect()
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn append(
        &self,
        table: &TableRef,
        rows: &DataFrame,
        schema: &DestinationSchema,
    ) -> Result<usize, WarehouseError> {
        let columns = bound_columns(rows, schema)?;
        let table_sql = quoted(&table.to_string());
        let column_list = schema
            .fields()
            .iter()
            .map(|field| quoted(field.name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        if table.parts().len() > 1 {
            let schema_name = quoted(&table.parts()[..table.parts().len() - 1].join("."));
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema_name}"))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        sqlx::query(&create_table_sql(table, schema))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let height = rows.height();
        for start in (0..height).step_by(INSERT_CHUNK_ROWS) {
            let end = (start + INSERT_CHUNK_ROWS).min(height);
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {table_sql} ({column_list}) "));
            builder.push_values(start..end, |mut values, idx| {
                for column in &columns {
                    match column {
                        BoundColumn::Integer(ca) => {
                            values.push_bind(ca.get(idx));
                        }
                        BoundColumn::String(ca) => {
                            values.push_bind(ca.get(idx).map(str::to_owned));
                        }
                        BoundColumn::Float(ca) => {
                            values.push_bind(ca.get(idx));
                        }
                    }
                }
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            debug!(table = %table, start, end, "inserted chunk");
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_matches_destination_schema() {
        let table = TableRef::parse("salesdataset.output").unwrap();
        let sql = create_table_sql(&table, &DestinationSchema::sales_output());
        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "salesdataset"."output" ("#));
        assert!(sql.contains(r#""SaleId" BIGINT NOT NULL"#));
        assert!(sql.contains(r#""Country" TEXT NOT NULL"#));
        assert!(sql.contains(r#""INR_Amount" DOUBLE PRECISION NOT NULL"#));
    }
}
