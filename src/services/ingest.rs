use crate::api::error::UploadError;
use crate::config::UploadConfig;
use crate::models::UploadResult;
use crate::services::multipart::{SizeLimited, UploadPart, open_multipart, select_file_part};
use crate::services::sniff::{SNIFF_LEN, sniff_head};
use crate::services::staging::StagingFile;
use crate::services::storage::LocalStorage;
use crate::utils::id::UploadId;
use crate::utils::validation::validate_csv_upload;
use axum::{body::Body, http::HeaderMap};
use chrono::Utc;

/// Request lifecycle. Stages only move forward; `Published` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UploadStage {
    Received,
    Routed,
    PartSelected,
    Sniffed,
    Streaming,
    Finalizing,
    Published,
    Aborted,
}

/// Logs stage transitions for one request. Dropping the tracker before
/// `Published` records the request as `Aborted`.
struct StageTracker {
    stage: UploadStage,
    id: Option<UploadId>,
}

impl StageTracker {
    fn new() -> Self {
        let mut tracker = Self {
            stage: UploadStage::Received,
            id: None,
        };
        tracker.advance(UploadStage::Routed);
        tracker
    }

    fn advance(&mut self, next: UploadStage) {
        debug_assert!(next > self.stage, "stage {:?} after {:?}", next, self.stage);
        tracing::debug!(from = ?self.stage, to = ?next, upload_id = ?self.id.as_ref().map(UploadId::as_str), "Upload stage");
        self.stage = next;
    }
}

impl Drop for StageTracker {
    fn drop(&mut self) {
        if self.stage != UploadStage::Published {
            let id = self.id.as_ref().map(UploadId::as_str).unwrap_or("-");
            tracing::debug!(from = ?self.stage, upload_id = %id, "Upload stage Aborted");
            self.stage = UploadStage::Aborted;
        }
    }
}

/// The streaming CSV ingestion pipeline.
///
/// Part selection, sniffing and validation, a single write-and-hash pass into a
/// staging file, then an atomic rename. Every exit other than a successful
/// publish leaves no staging or published file behind.
pub struct IngestService {
    storage: LocalStorage,
    config: UploadConfig,
}

impl IngestService {
    pub fn new(storage: LocalStorage, config: UploadConfig) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    /// Runs the pipeline over a raw multipart request body under the configured
    /// deadline. Expiry drops the in-flight work, which removes the staging file.
    pub async fn ingest_body(
        &self,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<UploadResult, UploadError> {
        let deadline = self.config.request_timeout;
        match tokio::time::timeout(deadline, self.ingest_multipart(headers, body)).await {
            Ok(result) => result,
            Err(_) => Err(UploadError::Timeout(deadline)),
        }
    }

    async fn ingest_multipart(
        &self,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<UploadResult, UploadError> {
        let limit = self.config.max_upload_bytes;
        let mut multipart = open_multipart(headers, body, limit)?;
        let part = select_file_part(&mut multipart, limit).await?;
        self.ingest_part(part).await
    }

    /// Stores one selected part. The part is consumed whatever the outcome.
    pub async fn ingest_part<P: UploadPart>(&self, part: P) -> Result<UploadResult, UploadError> {
        let mut tracker = StageTracker::new();
        let mut part = SizeLimited::new(part, self.config.max_upload_bytes);
        tracker.advance(UploadStage::PartSelected);

        let id = UploadId::generate().map_err(UploadError::IdGeneration)?;
        tracker.id = Some(id.clone());

        let dir = self
            .storage
            .ensure_month_dir(Utc::now())
            .await
            .map_err(UploadError::StorageUnavailable)?;
        let paths = LocalStorage::upload_paths(&dir, &id, &self.config.allowed_extension);
        let mut staging = StagingFile::create(&paths, self.config.write_buffer_size)
            .await
            .map_err(UploadError::WriteFailure)?;

        let head = part.read_head(SNIFF_LEN).await?;
        let content_type = sniff_head(&head);
        validate_csv_upload(part.filename(), content_type, &self.config)?;
        tracker.advance(UploadStage::Sniffed);

        tracker.advance(UploadStage::Streaming);
        staging.write(&head).await?;
        while let Some(chunk) = part.next_chunk().await? {
            staging.write(&chunk).await?;
        }
        part.close();

        if staging.bytes_written() == 0 {
            return Err(UploadError::EmptyUpload);
        }

        tracker.advance(UploadStage::Finalizing);
        let published = staging.publish().await?;
        tracker.advance(UploadStage::Published);

        tracing::info!(
            upload_id = %id,
            bytes = published.bytes_written,
            content_type,
            path = %published.path.display(),
            "✅ Upload published"
        );

        Ok(UploadResult {
            id: id.to_string(),
            bytes_written: published.bytes_written,
            sha256: published.sha256,
            content_type: content_type.to_string(),
            filename: paths.file_name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::hash::calculate_hash;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};

    /// In-memory part fed from a list of chunks; `None` entries fail the read.
    struct MemoryPart {
        filename: String,
        chunks: VecDeque<Option<Bytes>>,
    }

    impl MemoryPart {
        fn new(filename: &str, chunks: &[&[u8]]) -> Self {
            Self {
                filename: filename.to_string(),
                chunks: chunks
                    .iter()
                    .map(|c| Some(Bytes::copy_from_slice(c)))
                    .collect(),
            }
        }

        fn failing_after(mut self) -> Self {
            self.chunks.push_back(None);
            self
        }
    }

    #[async_trait]
    impl UploadPart for MemoryPart {
        fn form_field(&self) -> &str {
            "file"
        }

        fn filename(&self) -> &str {
            &self.filename
        }

        async fn read_head(&mut self, n: usize) -> Result<Vec<u8>, UploadError> {
            let mut head = Vec::new();
            while head.len() < n {
                let Some(mut chunk) = self.next_chunk().await? else {
                    break;
                };
                let wanted = n - head.len();
                if chunk.len() > wanted {
                    self.chunks.push_front(Some(chunk.split_off(wanted)));
                }
                head.extend_from_slice(&chunk);
            }
            Ok(head)
        }

        async fn next_chunk(&mut self) -> Result<Option<Bytes>, UploadError> {
            match self.chunks.pop_front() {
                Some(Some(chunk)) => Ok(Some(chunk)),
                Some(None) => Err(UploadError::MalformedMultipart(
                    "connection reset".to_string(),
                )),
                None => Ok(None),
            }
        }
    }

    fn service(root: &Path) -> IngestService {
        IngestService::new(LocalStorage::new(root), UploadConfig::with_root(root))
    }

    fn files_under(root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut dirs = vec![root.to_path_buf()];
        while let Some(dir) = dirs.pop() {
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    dirs.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files
    }

    #[tokio::test]
    async fn test_ingest_publishes_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());

        let result = svc
            .ingest_part(MemoryPart::new("t.csv", &[b"a,b\n", b"1,2\n"]))
            .await
            .unwrap();

        assert_eq!(result.bytes_written, 8);
        assert_eq!(result.sha256, calculate_hash(b"a,b\n1,2\n"));
        assert_eq!(result.content_type, "application/octet-stream");
        assert_eq!(result.filename, format!("{}.csv", result.id));

        let files = files_under(tmp.path());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with(&result.filename));
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_head_spanning_many_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let row: &[u8] = b"name,value\n";
        let chunks: Vec<&[u8]> = std::iter::repeat(row).take(100).collect();
        let expected = row.repeat(100);

        let result = svc
            .ingest_part(MemoryPart::new("big.csv", &chunks))
            .await
            .unwrap();

        assert_eq!(result.bytes_written, expected.len() as u64);
        assert_eq!(result.sha256, calculate_hash(&expected));
        assert_eq!(result.content_type, "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn test_empty_upload_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());

        let err = svc
            .ingest_part(MemoryPart::new("empty.csv", &[]))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::EmptyUpload));
        assert!(files_under(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_extension_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());

        let err = svc
            .ingest_part(MemoryPart::new("t.txt", &[b"a,b\n1,2\n"]))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::UnsupportedExtension(ref ext) if ext == ".txt"));
        assert!(files_under(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_content_type() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());

        let err = svc
            .ingest_part(MemoryPart::new("t.csv", &[b"%PDF-1.4\n..."]))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::UnsupportedContentType(ref ct) if ct == "application/pdf"));
        assert!(files_under(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_mid_stream_removes_staging() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(tmp.path());
        let part = MemoryPart::new("t.csv", &[&[b'x'; 600], b"more"]).failing_after();

        let err = svc.ingest_part(part).await.unwrap_err();

        assert!(matches!(err, UploadError::MalformedMultipart(_)));
        assert!(files_under(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_size_ceiling() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = UploadConfig::with_root(tmp.path());
        config.max_upload_bytes = 1000;
        let svc = IngestService::new(LocalStorage::new(tmp.path()), config);

        let chunk = [b'1'; 400];
        let exact = svc
            .ingest_part(MemoryPart::new("ok.csv", &[&chunk, &chunk, &chunk[..200]]))
            .await
            .unwrap();
        assert_eq!(exact.bytes_written, 1000);

        let err = svc
            .ingest_part(MemoryPart::new("big.csv", &[&chunk, &chunk, &chunk]))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::EntityTooLarge { limit: 1000 }));
        assert_eq!(files_under(tmp.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_storage() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let svc = service(&blocker);

        let err = svc
            .ingest_part(MemoryPart::new("t.csv", &[b"a,b\n"]))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::StorageUnavailable(_)));
    }

    #[test]
    fn test_stage_order() {
        assert!(UploadStage::Received < UploadStage::Routed);
        assert!(UploadStage::Streaming < UploadStage::Finalizing);
        assert!(UploadStage::Finalizing < UploadStage::Published);
    }
}
