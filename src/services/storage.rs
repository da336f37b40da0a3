use crate::utils::id::UploadId;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};

pub const STAGING_SUFFIX: &str = ".part";

/// Staging and final locations of one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPaths {
    pub staging: PathBuf,
    pub published: PathBuf,
}

impl UploadPaths {
    /// Name of the published file, `<id>.csv`
    pub fn file_name(&self) -> String {
        self.published
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Filesystem namespace under the upload root: `<root>/<YYYY>/<MM>/<id><ext>`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn month_dir(&self, now: DateTime<Utc>) -> PathBuf {
        self.root
            .join(now.format("%Y").to_string())
            .join(now.format("%m").to_string())
    }

    /// Creates the month directory if absent. Safe under concurrent callers.
    pub async fn ensure_month_dir(&self, now: DateTime<Utc>) -> io::Result<PathBuf> {
        let dir = self.month_dir(now);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    pub fn upload_paths(dir: &Path, id: &UploadId, extension: &str) -> UploadPaths {
        let published = dir.join(format!("{}{}", id, extension));
        let staging = dir.join(format!("{}{}{}", id, extension, STAGING_SUFFIX));
        UploadPaths { staging, published }
    }

    /// True when the root exists and is a writable directory
    pub async fn is_writable(&self) -> bool {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
            Err(_) => false,
        }
    }
}

pub async fn setup_storage(root: &Path) -> io::Result<LocalStorage> {
    if tokio::fs::metadata(root).await.is_err() {
        tracing::info!("📁 Upload root '{}' not found, creating...", root.display());
        tokio::fs::create_dir_all(root).await?;
    }
    tracing::info!("✅ Upload root '{}' is ready", root.display());
    Ok(LocalStorage::new(root))
}
