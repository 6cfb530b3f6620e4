use std::collections::HashSet;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use polars::prelude::*;

use crate::errors::ParserError;
use crate::registry::{FileFormat, FileParser};

/// Reads the first worksheet of a workbook. The first row is the header; fully
/// blank rows are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadsheetParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Empty,
    Integer,
    Float,
    Boolean,
    Text,
}

impl CellKind {
    fn of(cell: &Data) -> Self {
        match cell {
            Data::Empty | Data::Error(_) => CellKind::Empty,
            Data::Int(_) => CellKind::Integer,
            Data::Float(value) if is_integral(*value) => CellKind::Integer,
            Data::Float(_) => CellKind::Float,
            Data::Bool(_) => CellKind::Boolean,
            _ => CellKind::Text,
        }
    }

    fn merge(self, other: CellKind) -> CellKind {
        match (self, other) {
            (CellKind::Empty, kind) | (kind, CellKind::Empty) => kind,
            (a, b) if a == b => a,
            (CellKind::Integer, CellKind::Float) | (CellKind::Float, CellKind::Integer) => {
                CellKind::Float
            }
            _ => CellKind::Text,
        }
    }
}

fn is_integral(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64
}

impl SpreadsheetParser {
    const NAME: &'static str = "SPREADSHEET";

    fn header_names(header: &[Data]) -> Result<Vec<String>, ParserError> {
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(header.len());
        for (idx, cell) in header.iter().enumerate() {
            let name = match cell {
                Data::Empty => format!("Unnamed: {idx}"),
                Data::String(value) => value.clone(),
                other => other.to_string(),
            };
            if !seen.insert(name.clone()) {
                return Err(ParserError::InvalidHeader {
                    parser: Self::NAME,
                    message: format!("duplicate column '{name}'"),
                });
            }
            names.push(name);
        }
        Ok(names)
    }

    fn build_column(name: &str, cells: &[Data]) -> Column {
        let kind = cells
            .iter()
            .fold(CellKind::Empty, |kind, cell| kind.merge(CellKind::of(cell)));

        let series = match kind {
            CellKind::Empty => Series::full_null(name.into(), cells.len(), &DataType::String),
            CellKind::Integer => {
                let values: Vec<Option<i64>> = cells
                    .iter()
                    .map(|cell| match cell {
                        Data::Int(value) => Some(*value),
                        Data::Float(value) => Some(*value as i64),
                        _ => None,
                    })
                    .collect();
                Series::new(name.into(), values)
            }
            CellKind::Float => {
                let values: Vec<Option<f64>> = cells
                    .iter()
                    .map(|cell| match cell {
                        Data::Int(value) => Some(*value as f64),
                        Data::Float(value) => Some(*value),
                        _ => None,
                    })
                    .collect();
                Series::new(name.into(), values)
            }
            CellKind::Boolean => {
                let values: Vec<Option<bool>> = cells
                    .iter()
                    .map(|cell| match cell {
                        Data::Bool(value) => Some(*value),
                        _ => None,
                    })
                    .collect();
                Series::new(name.into(), values)
            }
            CellKind::Text => {
                let values: Vec<Option<String>> = cells
                    .iter()
                    .map(|cell| match cell {
                        Data::Empty | Data::Error(_) => None,
                        Data::String(value) => Some(value.clone()),
                        other => Some(other.to_string()),
                    })
                    .collect();
                Series::new(name.into(), values)
            }
        };

        series.into()
    }
}

impl FileParser for SpreadsheetParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn format(&self) -> FileFormat {
        FileFormat::Spreadsheet
    }

    fn parse_path(&self, path: &Path) -> Result<DataFrame, ParserError> {
        let workbook_error = |source| ParserError::Workbook {
            parser: Self::NAME,
            path: path.to_path_buf(),
            source,
        };

        let mut workbook = open_workbook_auto(path).map_err(workbook_error)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ParserError::EmptyData {
                parser: Self::NAME,
                path: path.to_path_buf(),
            })?
            .map_err(workbook_error)?;

        let mut rows = range.rows();
        let header = rows.next().ok_or_else(|| ParserError::EmptyData {
            parser: Self::NAME,
            path: path.to_path_buf(),
        })?;
        let names = Self::header_names(header)?;

        let mut cells: Vec<Vec<Data>> = vec![Vec::with_capacity(range.height()); names.len()];
        for row in rows {
            if row.iter().all(|cell| matches!(cell, Data::Empty)) {
                continue;
            }
            for (idx, column) in cells.iter_mut().enumerate() {
                column.push(row.get(idx).cloned().unwrap_or(Data::Empty));
            }
        }

        let columns: Vec<Column> = names
            .iter()
            .zip(cells.iter())
            .map(|(name, values)| Self::build_column(name, values))
            .collect();

        DataFrame::new(columns).map_err(|source| ParserError::Polars {
            parser: Self::NAME,
            path: path.to_path_buf(),
            source,
        })
    }
}
