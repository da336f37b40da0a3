use crate::api::error::UploadError;
use crate::config::UploadConfig;
use mime::Mime;

/// Lowercased extension of the final path component, including the dot.
///
/// `"data.CSV"` gives `".csv"`, `"archive.tar.gz"` gives `".gz"`, `"README"` gives `""`.
/// A leading dot counts, so `".csv"` gives `".csv"`.
pub fn file_extension(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    match base.rfind('.') {
        Some(idx) => base[idx..].to_lowercase(),
        None => String::new(),
    }
}

/// Media type without parameters, lowercased (`"text/plain; charset=utf-8"` -> `"text/plain"`)
pub fn mime_essence(content_type: &str) -> String {
    match content_type.parse::<Mime>() {
        Ok(mime) => mime.essence_str().to_lowercase(),
        Err(_) => content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase(),
    }
}

pub fn validate_extension(filename: &str, allowed_extension: &str) -> Result<(), UploadError> {
    let extension = file_extension(filename);
    if extension == allowed_extension {
        return Ok(());
    }
    Err(UploadError::UnsupportedExtension(extension))
}

pub fn validate_mime_type(content_type: &str, allowed: &[String]) -> Result<(), UploadError> {
    let essence = mime_essence(content_type);
    if allowed.iter().any(|m| *m == essence) {
        return Ok(());
    }
    Err(UploadError::UnsupportedContentType(content_type.to_string()))
}

/// Extension is checked before the sniffed type, so it wins when both are wrong.
pub fn validate_csv_upload(
    filename: &str,
    sniffed_content_type: &str,
    config: &UploadConfig,
) -> Result<(), UploadError> {
    validate_extension(filename, &config.allowed_extension)?;
    validate_mime_type(sniffed_content_type, &config.allowed_mime_types)
}
