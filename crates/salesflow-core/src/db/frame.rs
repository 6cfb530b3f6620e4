use polars::prelude::*;

use super::DatabaseError;

/// A single decoded database value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Null,
    Int,
    Float,
    Bool,
    Text,
}

impl ColumnKind {
    fn of(value: &CellValue) -> Self {
        match value {
            CellValue::Null => ColumnKind::Null,
            CellValue::Int(_) => ColumnKind::Int,
            CellValue::Float(_) => ColumnKind::Float,
            CellValue::Bool(_) => ColumnKind::Bool,
            CellValue::Text(_) => ColumnKind::Text,
        }
    }

    fn merge(self, other: ColumnKind) -> ColumnKind {
        match (self, other) {
            (ColumnKind::Null, kind) | (kind, ColumnKind::Null) => kind,
            (a, b) if a == b => a,
            (ColumnKind::Int, ColumnKind::Float) | (ColumnKind::Float, ColumnKind::Int) => {
                ColumnKind::Float
            }
            _ => ColumnKind::Text,
        }
    }
}

/// Accumulates rows column-wise and builds a typed frame once all rows are in.
#[derive(Debug)]
pub struct FrameBuilder {
    names: Vec<String>,
    columns: Vec<Vec<CellValue>>,
}

impl FrameBuilder {
    pub fn new(names: Vec<String>) -> Self {
        let columns = vec![Vec::new(); names.len()];
        Self { names, columns }
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) -> Result<(), DatabaseError> {
        if row.len() != self.names.len() {
            return Err(DatabaseError::RowWidth {
                expected: self.names.len(),
                found: row.len(),
            });
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
        Ok(())
    }

    pub fn build(self) -> Result<DataFrame, DatabaseError> {
        let columns: Vec<Column> = self
            .names
            .iter()
            .zip(self.columns)
            .map(|(name, values)| build_column(name, values))
            .collect();
        Ok(DataFrame::new(columns)?)
    }
}

fn build_column(name: &str, values: Vec<CellValue>) -> Column {
    let kind = values
        .iter()
        .fold(ColumnKind::Null, |kind, value| kind.merge(ColumnKind::of(value)));

    let series = match kind {
        ColumnKind::Null => Series::full_null(name.into(), values.len(), &DataType::String),
        ColumnKind::Int => {
            let data: Vec<Option<i64>> = values
                .into_iter()
                .map(|value| match value {
                    CellValue::Int(v) => Some(v),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), data)
        }
        ColumnKind::Float => {
            let data: Vec<Option<f64>> = values
                .into_iter()
                .map(|value| match value {
                    CellValue::Int(v) => Some(v as f64),
                    CellValue::Float(v) => Some(v),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), data)
        }
        ColumnKind::Bool => {
            let data: Vec<Option<bool>> = values
                .into_iter()
                .map(|value| match value {
                    CellValue::Bool(v) => Some(v),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), data)
        }
        ColumnKind::Text => {
            let data: Vec<Option<String>> = values
                .into_iter()
                .map(|value| match value {
                    CellValue::Null => None,
                    CellValue::Int(v) => Some(v.to_string()),
                    CellValue::Float(v) => Some(v.to_string()),
                    CellValue::Bool(v) => Some(v.to_string()),
                    CellValue::Text(v) => Some(v),
                })
                .collect();
            Series::new(name.into(), data)
        }
    };

    series.into()
}
