use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::model::{FieldType, AMOUNT, INPUT_COLUMNS, PRICE, QTY};

/// What the cleaner removed from one combined dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub dropped_null: usize,
    pub dropped_negative: usize,
    pub rows_out: usize,
}

impl CleaningReport {
    pub fn dropped(&self) -> usize {
        self.dropped_null + self.dropped_negative
    }
}

/// Drops every row with a null (or NaN) in any input column, then every row
/// with a negative quantity, price or amount. Fails when nothing is left.
pub fn clean(frame: &DataFrame) -> Result<(DataFrame, CleaningReport)> {
    let len = frame.height();
    let mut incomplete = vec![false; len];

    for field in INPUT_COLUMNS.iter() {
        let column = frame.column(field.name)?;
        for (idx, is_null) in column.is_null().into_iter().enumerate() {
            if is_null == Some(true) {
                incomplete[idx] = true;
            }
        }
        if field.field_type == FieldType::Float {
            for (idx, value) in column.f64()?.into_iter().enumerate() {
                if value.is_some_and(f64::is_nan) {
                    incomplete[idx] = true;
                }
            }
        }
    }

    let qty = frame.column(QTY)?.i64()?;
    let price = frame.column(PRICE)?.f64()?;
    let amount = frame.column(AMOUNT)?.f64()?;

    let mut report = CleaningReport {
        rows_in: len,
        ..CleaningReport::default()
    };
    let mut keep = Vec::with_capacity(len);
    for (idx, &is_incomplete) in incomplete.iter().enumerate() {
        if is_incomplete {
            report.dropped_null += 1;
            keep.push(false);
            continue;
        }
        let negative = qty.get(idx).is_some_and(|v| v < 0)
            || price.get(idx).is_some_and(|v| v < 0.0)
            || amount.get(idx).is_some_and(|v| v < 0.0);
        if negative {
            report.dropped_negative += 1;
        }
        keep.push(!negative);
    }

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    let cleaned = frame.filter(&mask)?;
    report.rows_out = cleaned.height();

    if report.dropped_null > 0 {
        warn!(rows = report.dropped_null, "dropped rows with missing values");
    }
    if report.dropped_negative > 0 {
        warn!(rows = report.dropped_negative, "dropped rows with negative values");
    }
    info!(rows_in = report.rows_in, rows_out = report.rows_out, "cleaned dataset");

    if report.rows_out == 0 {
        return Err(PipelineError::NoDataAfterCleaning {
            rows_in: report.rows_in,
        });
    }
    Ok((cleaned, report))
}
