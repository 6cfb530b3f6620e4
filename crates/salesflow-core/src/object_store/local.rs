use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{ObjectStore, ObjectStoreError};

/// Serves objects from `<root>/<bucket>/<key>` on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ObjectStoreError> {
        let escapes = |value: &str| {
            Path::new(value)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        };
        if escapes(bucket) || escapes(key) {
            return Err(ObjectStoreError::AccessDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), ObjectStoreError> {
        let source = self.object_path(bucket, key)?;
        std::fs::copy(&source, dest).map_err(|err| match err.kind() {
            ErrorKind::NotFound => ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            ErrorKind::PermissionDenied => ObjectStoreError::AccessDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            _ => ObjectStoreError::Unavailable(format!("{}: {err}", source.display())),
        })?;
        Ok(())
    }
}
