//! Scoped on-disk storage for uploaded reports.
//!
//! Every upload gets its own randomly suffixed file inside the upload
//! directory, so concurrent requests with the same client filename never
//! collide. A [`StoredFile`] deletes its file when dropped; the handler calls
//! [`StoredFile::remove`] on the normal path to observe cleanup errors.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// Longest filename stem kept in the on-disk name.
const MAX_STEM_LEN: usize = 64;

/// Upload directory shared by all requests.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Relative directories are resolved against the working directory, the
    /// same way `tempfile_in` resolves them, so [`StoredFile::path`] always
    /// starts with [`UploadStore::dir`].
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let dir = std::path::absolute(&dir).unwrap_or(dir);
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the upload directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Persist `data` under a unique name derived from `original_name`.
    pub async fn store(&self, original_name: &str, data: &[u8]) -> io::Result<StoredFile> {
        self.ensure_dir().await?;

        let prefix = format!("{}-", storage_stem(original_name));
        let named = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".pdf")
            .rand_bytes(8)
            .tempfile_in(&self.dir)?;

        // From here on the TempPath owns deletion, including on write failure.
        let (file, path) = named.into_parts();
        let mut file = tokio::fs::File::from_std(file);
        file.write_all(data).await?;
        file.flush().await?;

        Ok(StoredFile {
            path,
            original_name: original_name.to_string(),
            size: data.len() as u64,
        })
    }
}

/// One uploaded report on disk, alive for a single request.
#[derive(Debug)]
pub struct StoredFile {
    path: TempPath,
    original_name: String,
    size: u64,
}

impl StoredFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Filename as sent by the client.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime_type(&self) -> &'static str {
        "application/pdf"
    }

    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.path()).await
    }

    /// Delete the file now. A file that is already gone is not an error.
    pub fn remove(self) -> io::Result<()> {
        match self.path.close() {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Reduce a client-supplied filename to a safe, bounded stem.
///
/// Only the last path component survives, the `.pdf` suffix is dropped and
/// anything outside `[A-Za-z0-9._-]` becomes `_`.
fn storage_stem(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let base = base.strip_suffix(".pdf").unwrap_or(base);

    let stem: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();

    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "upload".to_string()
    } else {
        stem.to_string()
    }
}
