// crates/salesflow-core/src/error.rs

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("source {source_name} unavailable: {detail}")]
    SourceUnavailable { source_name: String, detail: String },

    #[error("source {source_name} declares unsupported format '{format}'")]
    UnsupportedFormat { source_name: String, format: String },

    #[error("source {source_name} does not match the canonical schema: {detail}")]
    SchemaMismatch { source_name: String, detail: String },

    #[error("no sources were configured for this run")]
    EmptyInput,

    #[error("no rows left after cleaning ({rows_in} rows examined)")]
    NoDataAfterCleaning { rows_in: usize },

    #[error("refusing to append an empty batch to {table}")]
    EmptyLoad { table: String },

    #[error("schema violation on column {column}: {detail}")]
    SchemaViolation { column: String, detail: String },

    #[error("warehouse quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("warehouse unavailable: {0}")]
    WarehouseUnavailable(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl PipelineError {
    /// Stable name of the error variant, used in run reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable { .. } => "source_unavailable",
            PipelineError::UnsupportedFormat { .. } => "unsupported_format",
            PipelineError::SchemaMismatch { .. } => "schema_mismatch",
            PipelineError::EmptyInput => "empty_input",
            PipelineError::NoDataAfterCleaning { .. } => "no_data_after_cleaning",
            PipelineError::EmptyLoad { .. } => "empty_load",
            PipelineError::SchemaViolation { .. } => "schema_violation",
            PipelineError::QuotaExceeded(_) => "quota_exceeded",
            PipelineError::WarehouseUnavailable(_) => "warehouse_unavailable",
            PipelineError::Config(_) => "config",
            PipelineError::Polars(_) => "processing",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Reconcile,
    Combine,
    Clean,
    Normalize,
    Load,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Reconcile => "reconcile",
            Stage::Combine => "combine",
            Stage::Clean => "clean",
            Stage::Normalize => "normalize",
            Stage::Load => "load",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An aborted run: the stage that failed and the error it raised.
#[derive(Debug, Error)]
#[error("{stage} stage failed ({kind}): {error}", kind = .error.kind())]
pub struct RunFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

impl RunFailure {
    pub fn new(stage: Stage, error: PipelineError) -> Self {
        Self { stage, error }
    }

    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }
}

pub trait StageResultExt<T> {
    fn at_stage(self, stage: Stage) -> std::result::Result<T, RunFailure>;
}

impl<T> StageResultExt<T> for Result<T> {
    fn at_stage(self, stage: Stage) -> std::result::Result<T, RunFailure> {
        self.map_err(|error| RunFailure::new(stage, error))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("conversion rate for '{country}' must be positive and finite, got {rate}")]
    InvalidRate { country: String, rate: f64 },

    #[error("invalid table identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("source {0} is configured more than once")]
    DuplicateSource(String),

    #[error("invalid column alias '{from}' -> '{to}'")]
    InvalidAlias { from: String, to: String },

    #[error("configuration error: {0}")]
    Invalid(String),
}
