use crate::AppState;
use crate::api::error::UploadError;
use crate::models::{ErrorEnvelope, UploadResult};
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Uri},
};
use utoipa::ToSchema;

/// Multipart form accepted by the upload endpoint
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// CSV file; the filename must end in `.csv`
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[utoipa::path(
    post,
    path = "/v1/files/",
    request_body(content = UploadForm, content_type = "multipart/form-data", description = "CSV file upload"),
    responses(
        (status = 200, description = "File stored", body = UploadResult),
        (status = 400, description = "Missing file, empty filename, empty or malformed body", body = ErrorEnvelope),
        (status = 405, description = "Method other than POST", body = ErrorEnvelope),
        (status = 408, description = "Upload did not finish before the deadline", body = ErrorEnvelope),
        (status = 413, description = "File exceeds the size ceiling", body = ErrorEnvelope),
        (status = 415, description = "Not a .csv file or not CSV-like content", body = ErrorEnvelope),
        (status = 500, description = "Storage failure", body = ErrorEnvelope)
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResult>, UploadError> {
    let result = state.ingest.ingest_body(&headers, body).await?;
    Ok(Json(result))
}

/// Any non-POST method on the upload route. Nothing is read or written.
pub async fn method_not_allowed(method: Method) -> UploadError {
    UploadError::MethodNotAllowed(method)
}

pub async fn not_found(uri: Uri) -> UploadError {
    UploadError::NotFound(uri.path().to_string())
}
