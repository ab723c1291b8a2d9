use std::path::PathBuf;

use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::errors::LogoError;
use crate::models::LogoSize;

/// Filesystem blob store for rendered logos.
///
/// Layout is one directory per symbol with one PNG per size:
/// `{base}/AAPL/m.png`. The metadata store is the source of truth for
/// which blobs exist; this layer only moves bytes.
#[derive(Clone)]
pub struct LogoStorage {
    base_dir: PathBuf,
}

impl LogoStorage {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn logo_path(&self, symbol: &str, size: LogoSize) -> PathBuf {
        self.base_dir
            .join(symbol.to_uppercase())
            .join(format!("{}.png", size.as_str()))
    }

    /// Write one rendered PNG. The bytes land in a uniquely named temp file
    /// in the destination directory and are renamed into place, so readers
    /// never observe a partially written blob.
    pub async fn write_logo(
        &self,
        symbol: &str,
        size: LogoSize,
        data: &[u8],
    ) -> Result<PathBuf, LogoError> {
        let final_path = self.logo_path(symbol, size);
        let dir = final_path
            .parent()
            .ok_or_else(|| LogoError::internal("logo path has no parent directory"))?;

        fs::create_dir_all(dir)
            .await
            .map_err(|e| LogoError::storage(dir.display().to_string(), e))?;

        let tmp_path = dir.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&tmp_path, data)
            .await
            .map_err(|e| LogoError::storage(tmp_path.display().to_string(), e))?;

        if let Err(e) = fs::rename(&tmp_path, &final_path).await {
            // Best effort: don't leave temp files behind on a failed rename
            let _ = fs::remove_file(&tmp_path).await;
            return Err(LogoError::storage(final_path.display().to_string(), e));
        }

        debug!("Wrote {} bytes to {}", data.len(), final_path.display());
        Ok(final_path)
    }

    pub async fn read_logo(&self, symbol: &str, size: LogoSize) -> Result<Vec<u8>, LogoError> {
        let path = self.logo_path(symbol, size);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(LogoError::not_found(
                format!("logo blob {}", path.display()),
            )),
            Err(e) => Err(LogoError::storage(path.display().to_string(), e)),
        }
    }

    pub async fn exists(&self, symbol: &str, size: LogoSize) -> bool {
        fs::try_exists(self.logo_path(symbol, size))
            .await
            .unwrap_or(false)
    }

    /// Remove every rendered size for a symbol. Missing directories are fine.
    pub async fn delete_symbol(&self, symbol: &str) -> Result<(), LogoError> {
        let dir = self.base_dir.join(symbol.to_uppercase());
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!("Deleted logo blobs for '{}'", symbol.to_uppercase());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LogoError::storage(dir.display().to_string(), e)),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LogoStorage::new(dir.path());

        let path = storage
            .write_logo("aapl", LogoSize::M, b"png bytes")
            .await
            .unwrap();
        assert!(path.ends_with("AAPL/m.png"));

        let data = storage.read_logo("AAPL", LogoSize::M).await.unwrap();
        assert_eq!(data, b"png bytes");

        // No temp files should survive a successful write
        let mut entries = fs::read_dir(dir.path().join("AAPL")).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["m.png"]);
    }

    #[tokio::test]
    async fn read_missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LogoStorage::new(dir.path());

        let err = storage.read_logo("MSFT", LogoSize::Xs).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_symbol_removes_all_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LogoStorage::new(dir.path());

        storage.write_logo("NVDA", LogoSize::S, b"a").await.unwrap();
        storage.write_logo("NVDA", LogoSize::Xl, b"b").await.unwrap();
        assert!(storage.exists("NVDA", LogoSize::S).await);
        assert!(storage.exists("nvda", LogoSize::Xl).await);

        storage.delete_symbol("nvda").await.unwrap();
        assert!(!storage.exists("NVDA", LogoSize::S).await);
        assert!(!storage.exists("NVDA", LogoSize::Xl).await);

        // Deleting a symbol that has no blobs is not an error
        storage.delete_symbol("NVDA").await.unwrap();
    }

    #[tokio::test]
    async fn overwrite_replaces_existing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LogoStorage::new(dir.path());

        storage.write_logo("TSLA", LogoSize::L, b"old").await.unwrap();
        storage.write_logo("TSLA", LogoSize::L, b"new").await.unwrap();

        let data = storage.read_logo("TSLA", LogoSize::L).await.unwrap();
        assert_eq!(data, b"new");
    }
}
