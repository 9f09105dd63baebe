use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
};

use anyhow::bail;
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::info;

/// An uploaded artifact before it is handed to the store.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Local-disk artifact store. Artifacts are opaque blobs addressed by the
/// file-name reference this store hands out; content is never inspected.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
    counter: Arc<AtomicU64>,
}

impl LocalArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    fn extension(content_type: Option<&str>) -> &'static str {
        let Some(mime) = content_type.and_then(|ct| ct.parse::<mime::Mime>().ok()) else {
            return "bin";
        };
        if mime.type_() == mime::TEXT {
            "txt"
        } else if mime.subtype() == mime::PNG {
            "png"
        } else if mime.subtype() == mime::JPEG {
            "jpg"
        } else if mime.subtype() == mime::PDF {
            "pdf"
        } else {
            "bin"
        }
    }

    /// Store a blob and return its reference. The write goes through a
    /// temporary name so a reference never points at a partial file.
    pub async fn store(&self, bytes: &[u8], content_type: Option<&str>) -> anyhow::Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;
        let reference = format!(
            "{}-{}.{}",
            crate::utils::now_local().unix_timestamp_nanos(),
            self.counter.fetch_add(1, Ordering::Relaxed),
            Self::extension(content_type),
        );
        let temp_path = self.root.join(format!(".{reference}.tmp"));
        let mut file = File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        tokio::fs::rename(&temp_path, self.root.join(&reference)).await?;
        info!(%reference, size = bytes.len(), "stored artifact");
        Ok(reference)
    }

    /// Remove a stored artifact. Callers treat failure as non-fatal.
    pub async fn delete(&self, reference: &str) -> anyhow::Result<()> {
        tokio::fs::remove_file(self.path(reference)?).await?;
        Ok(())
    }

    pub async fn read(&self, reference: &str) -> anyhow::Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path(reference)?).await?)
    }

    fn path(&self, reference: &str) -> anyhow::Result<PathBuf> {
        // References are single flat file names handed out by `store`.
        if reference.is_empty()
            || reference.contains(['/', '\\'])
            || reference.contains("..")
        {
            bail!("invalid artifact reference: {reference}");
        }
        Ok(self.root.join(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_read_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let reference = store.store(b"report body", Some("text/plain")).await.unwrap();
        assert!(reference.ends_with(".txt"));
        assert_eq!(store.read(&reference).await.unwrap(), b"report body");
        store.delete(&reference).await.unwrap();
        assert!(store.read(&reference).await.is_err());
    }

    #[tokio::test]
    async fn rejects_traversal_references() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        assert!(store.delete("../etc/passwd").await.is_err());
        assert!(store.read("a/b").await.is_err());
    }

    #[tokio::test]
    async fn delete_of_missing_reference_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        assert!(store.delete("123-0.bin").await.is_err());
    }
}
