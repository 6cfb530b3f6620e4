use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use super::Warehouse;
use crate::error::{PipelineError, Result};
use crate::model::{DestinationSchema, TableRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReceipt {
    pub table: String,
    pub warehouse: &'static str,
    pub rows: usize,
}

/// Projects `frame` onto the destination schema with strict casts. Missing
/// columns, uncastable values and nulls are schema violations.
pub fn prepare_batch(
    frame: &DataFrame,
    schema: &DestinationSchema,
    table: &TableRef,
) -> Result<DataFrame> {
    if frame.height() == 0 {
        return Err(PipelineError::EmptyLoad {
            table: table.to_string(),
        });
    }

    let mut columns: Vec<Column> = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let violation = |detail: String| PipelineError::SchemaViolation {
            column: field.name.to_string(),
            detail,
        };
        let column = frame
            .column(field.name)
            .map_err(|_| violation("column is missing".to_string()))?;
        let series = column
            .as_materialized_series()
            .strict_cast(&field.field_type.dtype())
            .map_err(|_| {
                violation(format!(
                    "cannot coerce {} to {}",
                    column.dtype(),
                    field.field_type
                ))
            })?;
        if series.null_count() > 0 {
            return Err(violation(format!("{} null values", series.null_count())));
        }
        columns.push(series.into());
    }
    Ok(DataFrame::new(columns)?)
}

/// Validates the batch and appends it in a single call.
pub async fn load(
    warehouse: &dyn Warehouse,
    table: &TableRef,
    frame: &DataFrame,
    schema: &DestinationSchema,
) -> Result<LoadReceipt> {
    let batch = prepare_batch(frame, schema, table)?;
    let rows = warehouse.append(table, &batch, schema).await?;
    info!(table = %table, warehouse = warehouse.name(), rows, "appended batch");
    Ok(LoadReceipt {
        table: table.to_string(),
        warehouse: warehouse.name(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_frame(inr: Series) -> DataFrame {
        DataFrame::new(vec![
            Series::new("SaleId".into(), &[1i64]).into(),
            Series::new("Country".into(), &["Japan"]).into(),
            Series::new("Category".into(), &["A"]).into(),
            Series::new("Product".into(), &["P"]).into(),
            Series::new("Qty".into(), &[2i64]).into(),
            Series::new("Price".into(), &[10.0f64]).into(),
            Series::new("Amount".into(), &[20.0f64]).into(),
            inr.into(),
        ])
        .unwrap()
    }

    #[test]
    fn batch_follows_schema_order_and_types() {
        let mut frame = output_frame(Series::new("INR_Amount".into(), &[11i64]));
        frame = frame
            .select(["INR_Amount", "SaleId", "Country", "Category", "Product", "Qty", "Price", "Amount"])
            .unwrap();
        let schema = DestinationSchema::sales_output();
        let table = TableRef::parse("salesdataset.output").unwrap();

        let batch = prepare_batch(&frame, &schema, &table).unwrap();
        assert_eq!(batch.get_column_names_str(), schema.column_names());
        assert_eq!(batch.column("INR_Amount").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn empty_missing_and_null_columns_are_rejected() {
        let schema = DestinationSchema::sales_output();
        let table = TableRef::parse("salesdataset.output").unwrap();

        let empty = output_frame(Series::new("INR_Amount".into(), &[1.0f64]))
            .slice(0, 0);
        assert_eq!(
            prepare_batch(&empty, &schema, &table).unwrap_err().kind(),
            "empty_load"
        );

        let missing = output_frame(Series::new("Inr".into(), &[1.0f64]));
        match prepare_batch(&missing, &schema, &table).unwrap_err() {
            PipelineError::SchemaViolation { column, .. } => assert_eq!(column, "INR_Amount"),
            other => panic!("unexpected error: {other}"),
        }

        let null = output_frame(Series::new("INR_Amount".into(), &[None::<f64>]));
        assert_eq!(
            prepare_batch(&null, &schema, &table).unwrap_err().kind(),
            "schema_violation"
        );

        let text = output_frame(Series::new("INR_Amount".into(), &["lots"]));
        assert_eq!(
            prepare_batch(&text, &schema, &table).unwrap_err().kind(),
            "schema_violation"
        );
    }
}
