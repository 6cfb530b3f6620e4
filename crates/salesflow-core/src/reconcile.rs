//! Maps each source's native column names onto the canonical input columns and
//! casts them to canonical types, so every row set can be stacked.

use std::collections::{BTreeMap, HashMap};

use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::model::{
    input_column_names, ColumnPolicy, FieldType, RowSet, SchemaField, SourceDescriptor,
    INPUT_COLUMNS,
};

/// Upper-cases the first letter of every alphabetic run and lower-cases the
/// rest: `saleid` becomes `Saleid`, `inr_amount` becomes `Inr_Amount`.
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut previous_alphabetic = false;
    for ch in name.chars() {
        if ch.is_alphabetic() {
            if previous_alphabetic {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_alphabetic = true;
        } else {
            out.push(ch);
            previous_alphabetic = false;
        }
    }
    out
}

/// Canonical name for one source column. The per-source rename table wins
/// over both policies.
pub fn canonical_name(
    original: &str,
    policy: ColumnPolicy,
    aliases: &BTreeMap<String, String>,
    rename: &BTreeMap<String, String>,
) -> String {
    let name = match policy {
        ColumnPolicy::Verbatim => original.to_string(),
        ColumnPolicy::Normalize => {
            let titled = title_case(original.trim());
            aliases.get(&titled).cloned().unwrap_or(titled)
        }
    };
    match rename.get(&name).or_else(|| rename.get(original)) {
        Some(target) => target.clone(),
        None => name,
    }
}

/// Zero-row frame with the canonical input columns and dtypes.
pub fn empty_canonical_frame() -> PolarsResult<DataFrame> {
    let columns: Vec<Column> = INPUT_COLUMNS
        .iter()
        .map(|field| Series::new_empty(field.name.into(), &field.field_type.dtype()).into())
        .collect();
    DataFrame::new(columns)
}

pub fn reconcile(
    rows: RowSet,
    source: &SourceDescriptor,
    aliases: &BTreeMap<String, String>,
) -> Result<RowSet> {
    let RowSet {
        source: source_name,
        frame,
    } = rows;

    // A query that matched no rows reports no columns either.
    if frame.width() == 0 {
        debug!(source = %source_name, "source returned no columns, treating as empty");
        return Ok(RowSet::new(source_name, empty_canonical_frame()?));
    }

    let mismatch = |detail: String| PipelineError::SchemaMismatch {
        source_name: source_name.clone(),
        detail,
    };

    let mut mapped: HashMap<String, String> = HashMap::new();
    let mut extra: Vec<&str> = Vec::new();
    for original in frame.get_column_names_str() {
        let name = canonical_name(original, source.columns, aliases, &source.rename);
        if input_column_names().any(|canonical| canonical == name) {
            if let Some(previous) = mapped.insert(name.clone(), original.to_string()) {
                return Err(mismatch(format!(
                    "columns '{previous}' and '{original}' both map to '{name}'"
                )));
            }
        } else {
            extra.push(original);
        }
    }

    let missing: Vec<&str> = input_column_names()
        .filter(|name| !mapped.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(mismatch(format!(
            "missing columns {} (found {})",
            missing.join(", "),
            frame.get_column_names_str().join(", ")
        )));
    }
    if !extra.is_empty() {
        debug!(source = %source_name, columns = ?extra, "dropping non-canonical columns");
    }

    let mut columns: Vec<Column> = Vec::with_capacity(INPUT_COLUMNS.len());
    for field in INPUT_COLUMNS.iter() {
        let Some(original) = mapped.get(field.name) else {
            return Err(mismatch(format!("missing column {}", field.name)));
        };
        let series = frame
            .column(original)?
            .as_materialized_series()
            .clone()
            .with_name(field.name.into());
        let cast = cast_column(&series, field)
            .map_err(|detail| mismatch(format!("column {}: {detail}", field.name)))?;
        columns.push(cast.into());
    }

    Ok(RowSet::new(source_name, DataFrame::new(columns)?))
}

fn cast_column(series: &Series, field: &SchemaField) -> std::result::Result<Series, String> {
    let target = field.field_type.dtype();
    if series.dtype() == &target {
        return Ok(series.clone());
    }

    match field.field_type {
        FieldType::String => series.cast(&target).map_err(|err| err.to_string()),
        FieldType::Integer => {
            if series.dtype().is_float() {
                let values = series
                    .cast(&DataType::Float64)
                    .map_err(|err| err.to_string())?;
                let values = values.f64().map_err(|err| err.to_string())?;
                if let Some(bad) = values
                    .into_iter()
                    .flatten()
                    .find(|value| !value.is_finite() || value.fract() != 0.0)
                {
                    return Err(format!("{bad} is not an integer"));
                };
            }
            series
                .strict_cast(&target)
                .map_err(|_| format!("cannot cast {} to {}", series.dtype(), field.field_type))
        }
        FieldType::Float => series
            .strict_cast(&target)
            .map_err(|_| format!("cannot cast {} to {}", series.dtype(), field.field_type)),
    }
}
