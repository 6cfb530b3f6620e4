pub mod clean;
pub mod combine;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod normalize;
pub mod object_store;
pub mod pipeline;
pub mod readers;
pub mod reconcile;
pub mod warehouse;

pub use error::{PipelineError, RunFailure, Stage};
pub use pipeline::{run_pipeline, RunContext, RunSummary};
