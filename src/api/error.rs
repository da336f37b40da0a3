use crate::models::ErrorEnvelope;
use axum::{
    Json,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("missing file: the request has no multipart field named \"file\"")]
    MissingFile,

    #[error("missing filename: the \"file\" field has an empty filename")]
    EmptyFilename,

    #[error("empty upload: the file contains no bytes")]
    EmptyUpload,

    #[error("malformed multipart body: {0}")]
    MalformedMultipart(String),

    #[error("unsupported file extension \"{0}\": only .csv files are accepted")]
    UnsupportedExtension(String),

    #[error("unsupported content type \"{0}\": the file does not look like CSV")]
    UnsupportedContentType(String),

    #[error("upload exceeds the maximum allowed size of {limit} bytes")]
    EntityTooLarge { limit: u64 },

    #[error("method {0} is not allowed on this endpoint")]
    MethodNotAllowed(Method),

    #[error("no route for {0}")]
    NotFound(String),

    #[error("upload did not complete within {0:?}")]
    Timeout(Duration),

    #[error("failed to generate upload id: {0}")]
    IdGeneration(#[source] rand::Error),

    #[error("upload storage unavailable: {0}")]
    StorageUnavailable(#[source] std::io::Error),

    #[error("failed to write upload: {0}")]
    WriteFailure(#[source] std::io::Error),

    #[error("failed to publish upload: {0}")]
    PublishFailure(#[source] std::io::Error),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::MissingFile
            | UploadError::EmptyFilename
            | UploadError::EmptyUpload
            | UploadError::MalformedMultipart(_) => StatusCode::BAD_REQUEST,
            UploadError::UnsupportedExtension(_) | UploadError::UnsupportedContentType(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            UploadError::EntityTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            UploadError::NotFound(_) => StatusCode::NOT_FOUND,
            UploadError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            UploadError::IdGeneration(_)
            | UploadError::StorageUnavailable(_)
            | UploadError::WriteFailure(_)
            | UploadError::PublishFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error kind carried in the envelope's `error` field
    pub fn kind(&self) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::UNSUPPORTED_MEDIA_TYPE => "unsupported_media_type",
            StatusCode::PAYLOAD_TOO_LARGE => "request_entity_too_large",
            StatusCode::METHOD_NOT_ALLOWED => "method_not_allowed",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::REQUEST_TIMEOUT => "request_timeout",
            _ => "internal_server_error",
        }
    }

    /// Text sent to the client. Server-side failures never expose OS details.
    fn public_message(&self) -> String {
        match self {
            UploadError::IdGeneration(_) => "failed to generate upload id".to_string(),
            UploadError::StorageUnavailable(_) => "upload storage is unavailable".to_string(),
            UploadError::WriteFailure(_) => "failed to write upload".to_string(),
            UploadError::PublishFailure(_) => "failed to publish upload".to_string(),
            other => other.to_string(),
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.kind().to_string(),
            message: self.public_message(),
            code: self.status().as_u16(),
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "Upload failed: {}", self);
        } else {
            tracing::warn!("Upload rejected: {}", self);
        }

        let body = Json(self.envelope());
        if matches!(self, UploadError::MethodNotAllowed(_)) {
            return (status, [(header::ALLOW, "POST")], body).into_response();
        }
        (status, body).into_response()
    }
}
