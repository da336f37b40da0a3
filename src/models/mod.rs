use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Metadata returned for a published upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// 32 lowercase hex characters
    pub id: String,
    pub bytes_written: u64,
    /// Hex SHA-256 of the stored bytes
    pub sha256: String,
    /// Media type sniffed from the first 512 bytes
    pub content_type: String,
    /// Name of the published file, `<id>.csv`
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    pub error: String,
    pub message: String,
    pub code: u16,
}
