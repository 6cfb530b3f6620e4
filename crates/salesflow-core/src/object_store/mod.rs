//! Object-storage seam used by the file source readers.

mod local;
#[cfg(feature = "runtime")]
mod s3;
mod staging;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub use local::LocalObjectStore;
#[cfg(feature = "runtime")]
pub use s3::S3ObjectStore;
pub use staging::{StagedObject, StagingArea};

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("access denied: {bucket}/{key}")]
    AccessDenied { bucket: String, key: String },
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error("staging I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Downloads `bucket/key` to `dest`, overwriting anything already there.
    async fn fetch(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), ObjectStoreError>;
}
