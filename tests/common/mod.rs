#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use csv_ingest::config::UploadConfig;
use csv_ingest::services::storage::LocalStorage;
use csv_ingest::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const BOUNDARY: &str = "X-CSV-INGEST-TEST-BOUNDARY";

pub fn app_with(config: UploadConfig) -> Router {
    let storage = LocalStorage::new(config.upload_root.clone());
    create_app(AppState::new(storage, config))
}

pub fn app(root: &Path) -> Router {
    app_with(UploadConfig::with_root(root))
}

/// One form-data part; `filename: None` makes a plain field
pub fn part(name: &str, filename: Option<&str>, data: &[u8]) -> Vec<u8> {
    let disposition = match filename {
        Some(f) => format!("form-data; name=\"{}\"; filename=\"{}\"", name, f),
        None => format!("form-data; name=\"{}\"", name),
    };
    let mut raw = format!(
        "--{}\r\nContent-Disposition: {}\r\nContent-Type: application/octet-stream\r\n\r\n",
        BOUNDARY, disposition
    )
    .into_bytes();
    raw.extend_from_slice(data);
    raw.extend_from_slice(b"\r\n");
    raw
}

pub fn multipart_body(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut raw = parts.concat();
    raw.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    raw
}

pub fn upload_request(method: &str, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(body)
        .unwrap()
}

pub fn csv_upload(filename: &str, data: &[u8]) -> Request<Body> {
    let body = multipart_body(&[part("file", Some(filename), data)]);
    upload_request("POST", "/v1/files/", Body::from(body))
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Every regular file under `root`, recursively
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                dirs.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

pub fn entries_in(root: &Path) -> usize {
    std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
}
