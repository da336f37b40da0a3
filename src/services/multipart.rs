use crate::api::error::UploadError;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, header},
};
use bytes::Bytes;
use multer::{Constraints, Field, Multipart, SizeLimit};

/// Form field that carries the upload
pub const FILE_FIELD: &str = "file";

/// Slack on top of the file ceiling for boundaries and part headers
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Narrow view of one multipart part, as the ingest pipeline consumes it.
#[async_trait]
pub trait UploadPart: Send {
    fn form_field(&self) -> &str;

    fn filename(&self) -> &str;

    /// Reads up to `n` bytes from the start of the part. Fewer bytes mean the
    /// part ended. Bytes read here are not returned again by `next_chunk`.
    async fn read_head(&mut self, n: usize) -> Result<Vec<u8>, UploadError>;

    /// Next chunk of the remaining body, `None` once the part is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, UploadError>;

    /// Releases the part. Unread bytes are discarded.
    fn close(self)
    where
        Self: Sized,
    {
    }
}

pub(crate) fn map_multipart_error(err: multer::Error, limit: u64) -> UploadError {
    match err {
        multer::Error::StreamSizeExceeded { .. } | multer::Error::FieldSizeExceeded { .. } => {
            UploadError::EntityTooLarge { limit }
        }
        other => UploadError::MalformedMultipart(other.to_string()),
    }
}

/// Builds a streaming multipart reader over the request body, bounded so that
/// no field can exceed `max_upload_bytes`.
pub fn open_multipart(
    headers: &HeaderMap,
    body: Body,
    max_upload_bytes: u64,
) -> Result<Multipart<'static>, UploadError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| UploadError::MalformedMultipart("missing Content-Type header".to_string()))?;

    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| UploadError::MalformedMultipart(e.to_string()))?;

    let size_limit = SizeLimit::new()
        .whole_stream(max_upload_bytes.saturating_add(MULTIPART_OVERHEAD))
        .per_field(max_upload_bytes);
    let constraints = Constraints::new().size_limit(size_limit);

    Ok(Multipart::with_constraints(
        body.into_data_stream(),
        boundary,
        constraints,
    ))
}

/// Walks the parts in arrival order and returns the first one named `file`.
/// Other parts are dropped as soon as they are seen; parts after the match are
/// never read.
pub async fn select_file_part(
    multipart: &mut Multipart<'static>,
    max_upload_bytes: u64,
) -> Result<FilePart, UploadError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| map_multipart_error(e, max_upload_bytes))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name != FILE_FIELD {
            tracing::debug!(field = %name, "Discarding multipart field");
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(UploadError::EmptyFilename);
        }

        return Ok(FilePart {
            field,
            form_field: name,
            filename,
            pending: None,
            limit: max_upload_bytes,
        });
    }

    Err(UploadError::MissingFile)
}

/// The selected `file` part of a live multipart stream
pub struct FilePart {
    field: Field<'static>,
    form_field: String,
    filename: String,
    /// Tail of a chunk split by `read_head`
    pending: Option<Bytes>,
    limit: u64,
}

impl FilePart {
    async fn take_chunk(&mut self) -> Result<Option<Bytes>, UploadError> {
        if let Some(chunk) = self.pending.take() {
            return Ok(Some(chunk));
        }
        let limit = self.limit;
        self.field
            .chunk()
            .await
            .map_err(|e| map_multipart_error(e, limit))
    }
}

#[async_trait]
impl UploadPart for FilePart {
    fn form_field(&self) -> &str {
        &self.form_field
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    async fn read_head(&mut self, n: usize) -> Result<Vec<u8>, UploadError> {
        let mut head = Vec::with_capacity(n);
        while head.len() < n {
            let Some(mut chunk) = self.take_chunk().await? else {
                break;
            };
            let wanted = n - head.len();
            if chunk.len() > wanted {
                self.pending = Some(chunk.split_off(wanted));
            }
            head.extend_from_slice(&chunk);
        }
        Ok(head)
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, UploadError> {
        self.take_chunk().await
    }
}

/// Counts every byte pulled through the inner part and fails with
/// `EntityTooLarge` as soon as the running total passes the ceiling.
pub struct SizeLimited<P> {
    inner: P,
    limit: u64,
    read: u64,
}

impl<P: UploadPart> SizeLimited<P> {
    pub fn new(inner: P, limit: u64) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    fn account(&mut self, n: usize) -> Result<(), UploadError> {
        self.read = self.read.saturating_add(n as u64);
        if self.read > self.limit {
            return Err(UploadError::EntityTooLarge { limit: self.limit });
        }
        Ok(())
    }
}

#[async_trait]
impl<P: UploadPart> UploadPart for SizeLimited<P> {
    fn form_field(&self) -> &str {
        self.inner.form_field()
    }

    fn filename(&self) -> &str {
        self.inner.filename()
    }

    async fn read_head(&mut self, n: usize) -> Result<Vec<u8>, UploadError> {
        let head = self.inner.read_head(n).await?;
        self.account(head.len())?;
        Ok(head)
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, UploadError> {
        let chunk = self.inner.next_chunk().await?;
        if let Some(chunk) = &chunk {
            self.account(chunk.len())?;
        }
        Ok(chunk)
    }

    fn close(self) {
        self.inner.close();
    }
}
