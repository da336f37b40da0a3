use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum accepted file size: 200 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 200 << 20;

/// Staging write buffer: 1 MiB
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 1 << 20;

pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "text/csv",
    "application/vnd.ms-excel",
    "text/plain",
    "application/octet-stream",
];

/// Upload pipeline configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Root directory for staged and published uploads (default: "./data/uploads")
    pub upload_root: PathBuf,

    /// Maximum file size in bytes (default: 200 MiB)
    pub max_upload_bytes: u64,

    /// Deadline for reading and storing one upload (default: 60 s)
    pub request_timeout: Duration,

    /// Buffer size of the staging file writer (default: 1 MiB)
    pub write_buffer_size: usize,

    /// Accepted filename extension, lowercase with the leading dot
    pub allowed_extension: String,

    /// Accepted sniffed media types (compared without parameters)
    pub allowed_mime_types: Vec<String>,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_root: PathBuf::from("./data/uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            request_timeout: Duration::from_secs(60),
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            allowed_extension: ".csv".to_string(),
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            upload_root: env::var("UPLOAD_ROOT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.upload_root),

            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_bytes),

            request_timeout: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.request_timeout),

            write_buffer_size: env::var("WRITE_BUFFER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size: &usize| *size > 0)
                .unwrap_or(default.write_buffer_size),

            allowed_extension: default.allowed_extension,
            allowed_mime_types: default.allowed_mime_types,

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Default configuration rooted at `upload_root`
    pub fn with_root(upload_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            ..Self::default()
        }
    }
}
