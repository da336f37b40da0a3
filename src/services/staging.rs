use crate::api::error::UploadError;
use crate::services::storage::UploadPaths;
use crate::utils::hash::ChecksumAccumulator;
use std::path::PathBuf;
use tempfile::TempPath;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

/// A `.part` file owned by one in-flight upload.
///
/// The staging path is held by a [`TempPath`], so dropping a `StagingFile` for
/// any reason (error, client disconnect, deadline) removes it from disk. The
/// only way to keep the bytes is [`StagingFile::publish`], which renames the
/// file onto its final name.
pub struct StagingFile {
    writer: BufWriter<File>,
    guard: TempPath,
    published: PathBuf,
    checksum: ChecksumAccumulator,
}

/// Outcome of a successful publish
#[derive(Debug, Clone)]
pub struct PublishedFile {
    pub path: PathBuf,
    pub bytes_written: u64,
    pub sha256: String,
}

impl StagingFile {
    pub async fn create(paths: &UploadPaths, buffer_size: usize) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&paths.staging)
            .await?;
        let guard = TempPath::from_path(&paths.staging);

        Ok(Self {
            writer: BufWriter::with_capacity(buffer_size, file),
            guard,
            published: paths.published.clone(),
            checksum: ChecksumAccumulator::new(),
        })
    }

    /// Appends `data` to the file and the checksum in the same step.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), UploadError> {
        if data.is_empty() {
            return Ok(());
        }
        self.writer
            .write_all(data)
            .await
            .map_err(UploadError::WriteFailure)?;
        self.checksum.update(data);
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.checksum.bytes()
    }

    /// Flushes, syncs and closes the file, then renames it onto the published
    /// path. On any error the staging file is removed.
    pub async fn publish(self) -> Result<PublishedFile, UploadError> {
        let Self {
            mut writer,
            guard,
            published,
            checksum,
        } = self;

        writer.flush().await.map_err(UploadError::WriteFailure)?;
        let file = writer.into_inner();
        file.sync_all().await.map_err(UploadError::WriteFailure)?;
        drop(file);

        // No await between the rename and its result, so cancellation cannot
        // leave a renamed file behind an aborted request.
        guard
            .persist(&published)
            .map_err(|e| UploadError::PublishFailure(e.error))?;

        Ok(PublishedFile {
            path: published,
            bytes_written: checksum.bytes(),
            sha256: checksum.finalize_hex(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::LocalStorage;
    use crate::utils::hash::calculate_hash;
    use crate::utils::id::UploadId;

    fn paths(dir: &std::path::Path) -> UploadPaths {
        LocalStorage::upload_paths(dir, &UploadId::generate().unwrap(), ".csv")
    }

    #[tokio::test]
    async fn test_publish_renames_and_hashes() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = paths(tmp.path());

        let mut staging = StagingFile::create(&paths, 16).await.unwrap();
        assert!(paths.staging.exists());
        staging.write(b"a,b\n").await.unwrap();
        staging.write(b"1,2\n").await.unwrap();
        assert_eq!(staging.bytes_written(), 8);
        // Published name is not visible before the rename
        assert!(!paths.published.exists());

        let published = staging.publish().await.unwrap();
        assert_eq!(published.path, paths.published);
        assert_eq!(published.bytes_written, 8);
        assert_eq!(published.sha256, calculate_hash(b"a,b\n1,2\n"));
        assert!(!paths.staging.exists());
        assert_eq!(std::fs::read(&paths.published).unwrap(), b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_drop_removes_staging_file() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = paths(tmp.path());

        let mut staging = StagingFile::create(&paths, 1024).await.unwrap();
        staging.write(b"partial").await.unwrap();
        drop(staging);

        assert!(!paths.staging.exists());
        assert!(!paths.published.exists());
    }

    #[tokio::test]
    async fn test_publish_failure_removes_staging_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut paths = paths(tmp.path());
        paths.published = tmp.path().join("missing-dir").join("x.csv");

        let mut staging = StagingFile::create(&paths, 1024).await.unwrap();
        staging.write(b"a,b\n").await.unwrap();
        let err = staging.publish().await.err().unwrap();

        assert!(matches!(err, UploadError::PublishFailure(_)));
        assert!(!paths.staging.exists());
    }

    #[tokio::test]
    async fn test_create_fails_without_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = paths(&tmp.path().join("absent"));
        assert!(StagingFile::create(&paths, 1024).await.is_err());
    }
}
