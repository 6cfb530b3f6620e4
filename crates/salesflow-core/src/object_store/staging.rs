use std::fs;
use std::path::{Path, PathBuf};

use blake3::Hasher;
use tempfile::TempDir;
use tracing::debug;

use super::{ObjectStore, ObjectStoreError};

/// Run-scoped directory for downloaded objects. Removed with everything in it
/// when dropped.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn new(parent: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("salesflow-");
        let dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Local file for an object, named by a digest of its bucket and key so
    /// distinct objects never collide. Keeps the key's extension, which the
    /// spreadsheet parser relies on.
    pub fn local_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut hasher = Hasher::new();
        hasher.update(bucket.as_bytes());
        hasher.update(&[0]);
        hasher.update(key.as_bytes());
        let mut name = hasher.finalize().to_hex().to_string();

        let extension = Path::new(key)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|ch| ch.is_ascii_alphanumeric()));
        if let Some(extension) = extension {
            name.push('.');
            name.push_str(extension);
        }
        self.dir.path().join(name)
    }

    pub async fn stage(
        &self,
        store: &dyn ObjectStore,
        bucket: &str,
        key: &str,
    ) -> Result<StagedObject, ObjectStoreError> {
        let path = self.local_path(bucket, key);
        let mut staged = StagedObject {
            path,
            digest: String::new(),
            size: 0,
        };
        store.fetch(bucket, key, &staged.path).await?;

        let contents = fs::read(&staged.path)?;
        let mut hasher = Hasher::new();
        hasher.update(&contents);
        staged.digest = hasher.finalize().to_hex().to_string();
        staged.size = contents.len() as u64;

        debug!(
            store = store.name(),
            bucket,
            key,
            path = %staged.path.display(),
            "staged object"
        );
        Ok(staged)
    }
}

/// A downloaded object. The local copy is deleted when this is dropped.
#[derive(Debug)]
pub struct StagedObject {
    pub path: PathBuf,
    pub digest: String,
    pub size: u64,
}

impl Drop for StagedObject {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::LocalObjectStore;

    #[tokio::test]
    async fn staged_objects_are_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("bucket/nested")).unwrap();
        std::fs::write(root.path().join("bucket/nested/file.xlsx"), b"payload").unwrap();
        let store = LocalObjectStore::new(root.path());

        let staging = StagingArea::new(None).unwrap();
        let staged = staging
            .stage(&store, "bucket", "nested/file.xlsx")
            .await
            .unwrap();
        let path = staged.path.clone();

        assert_eq!(path.parent(), Some(staging.path()));
        assert_eq!(path.extension().and_then(|ext| ext.to_str()), Some("xlsx"));
        assert_eq!(staged.size, 7);
        assert_eq!(staged.digest, blake3::hash(b"payload").to_hex().to_string());
        assert!(path.exists());

        drop(staged);
        assert!(!path.exists());

        let staging_dir = staging.path().to_path_buf();
        drop(staging);
        assert!(!staging_dir.exists());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_no_local_copy() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(root.path());
        let staging = StagingArea::new(None).unwrap();

        let err = staging.stage(&store, "bucket", "absent.csv").await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::NotFound { .. }));
        assert!(!staging.local_path("bucket", "absent.csv").exists());
    }

    #[test]
    fn similar_keys_stage_to_distinct_files() {
        let staging = StagingArea::new(None).unwrap();
        let slashed = staging.local_path("a", "b/c.csv");
        let underscored = staging.local_path("a", "b_c.csv");
        let shifted = staging.local_path("a_b", "c.csv");

        assert_ne!(slashed, underscored);
        assert_ne!(slashed, shifted);
        assert_ne!(underscored, shifted);
        assert_eq!(slashed, staging.local_path("a", "b/c.csv"));
        assert!(slashed.to_string_lossy().ends_with(".csv"));
        assert_eq!(staging.local_path("a", "README").extension(), None);
    }
}
