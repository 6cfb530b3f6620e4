//! One scheduled run: extract, reconcile, combine, clean, normalize, load.
//! Stages run strictly in sequence and the first failure aborts the run
//! before anything is written.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, info_span, Instrument};

use crate::clean::{clean, CleaningReport};
use crate::combine::combine;
use crate::config::RunConfig;
use crate::error::{RunFailure, Stage, StageResultExt};
use crate::model::RowSet;
use crate::normalize::normalize;
use crate::readers::ReaderRegistry;
use crate::reconcile::reconcile;
use crate::warehouse::{load, prepare_batch, LoadReceipt, Warehouse};

/// Scheduler metadata for one invocation.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub logical_date: Option<NaiveDate>,
    /// Validate the batch but skip the append.
    pub dry_run: bool,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            logical_date: None,
            dry_run: false,
        }
    }

    pub fn with_logical_date(mut self, date: NaiveDate) -> Self {
        self.logical_date = Some(date);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub logical_date: Option<NaiveDate>,
    pub destination: String,
    pub sources: Vec<SourceSummary>,
    pub rows_combined: usize,
    pub cleaning: CleaningReport,
    pub rows_normalized: usize,
    pub dry_run: bool,
    pub load: Option<LoadReceipt>,
}

pub async fn run_pipeline(
    config: &RunConfig,
    readers: &ReaderRegistry,
    warehouse: &dyn Warehouse,
    context: &RunContext,
) -> Result<RunSummary, RunFailure> {
    let result = execute(config, readers, warehouse, context).await;
    if let Err(failure) = &result {
        error!(
            run_id = %context.run_id,
            stage = %failure.stage,
            kind = failure.kind(),
            error = %failure.error,
            "run failed"
        );
    }
    result
}

async fn execute(
    config: &RunConfig,
    readers: &ReaderRegistry,
    warehouse: &dyn Warehouse,
    context: &RunContext,
) -> Result<RunSummary, RunFailure> {
    let logical_date = context
        .logical_date
        .map(|date| date.to_string())
        .unwrap_or_default();
    let stage_span = |stage: Stage| {
        info_span!(
            "stage",
            run_id = %context.run_id,
            logical_date = %logical_date,
            stage = %stage
        )
    };

    let extracted: Vec<RowSet> = async {
        let mut extracted = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            extracted.push(readers.read(source).await.at_stage(Stage::Extract)?);
        }
        Ok::<_, RunFailure>(extracted)
    }
    .instrument(stage_span(Stage::Extract))
    .await?;

    let sources: Vec<SourceSummary> = extracted
        .iter()
        .map(|rows| SourceSummary {
            source: rows.source.clone(),
            rows: rows.height(),
        })
        .collect();

    let reconciled = stage_span(Stage::Reconcile).in_scope(|| {
        extracted
            .into_iter()
            .zip(&config.sources)
            .map(|(rows, source)| reconcile(rows, source, &config.aliases))
            .collect::<crate::error::Result<Vec<_>>>()
            .at_stage(Stage::Reconcile)
    })?;

    let combined = stage_span(Stage::Combine)
        .in_scope(|| combine(reconciled).at_stage(Stage::Combine))?;
    let rows_combined = combined.height();
    info!(run_id = %context.run_id, rows = rows_combined, "combined sources");

    let (cleaned, cleaning) =
        stage_span(Stage::Clean).in_scope(|| clean(&combined).at_stage(Stage::Clean))?;
    drop(combined);

    let normalized = stage_span(Stage::Normalize)
        .in_scope(|| normalize(cleaned, &config.rates).at_stage(Stage::Normalize))?;
    let rows_normalized = normalized.height();

    let load_receipt = async {
        if context.dry_run {
            prepare_batch(&normalized, &config.schema, &config.destination)
                .at_stage(Stage::Load)?;
            info!(rows = rows_normalized, "dry run, skipping append");
            Ok::<_, RunFailure>(None)
        } else {
            load(warehouse, &config.destination, &normalized, &config.schema)
                .await
                .map(Some)
                .at_stage(Stage::Load)
        }
    }
    .instrument(stage_span(Stage::Load))
    .await?;

    info!(
        run_id = %context.run_id,
        destination = %config.destination,
        rows = rows_normalized,
        "run complete"
    );

    Ok(RunSummary {
        run_id: context.run_id.clone(),
        logical_date: context.logical_date,
        destination: config.destination.to_string(),
        sources,
        rows_combined,
        cleaning,
        rows_normalized,
        dry_run: context.dry_run,
        load: load_receipt,
    })
}
