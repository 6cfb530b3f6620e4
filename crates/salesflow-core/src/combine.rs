use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::model::RowSet;

/// Stacks reconciled row sets in the order given. Row order inside each
/// source is preserved and nothing is deduplicated.
pub fn combine(row_sets: Vec<RowSet>) -> Result<DataFrame> {
    let mut iter = row_sets.into_iter();
    let Some(first) = iter.next() else {
        return Err(PipelineError::EmptyInput);
    };

    debug!(source = %first.source, rows = first.height(), "combining");
    let mut combined = first.frame;
    for rows in iter {
        debug!(source = %rows.source, rows = rows.height(), "combining");
        combined.vstack_mut(&rows.frame)?;
    }
    combined.as_single_chunk_par();
    Ok(combined)
}
