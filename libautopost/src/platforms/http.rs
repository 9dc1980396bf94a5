//! Shared `reqwest` plumbing for the platform step APIs

use reqwest::multipart::Part;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;

use crate::error::PlatformError;

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, PlatformError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("autopost/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))
}

/// Transport-level failure: nothing usable came back
pub(crate) fn network_error(error: reqwest::Error, context: &str) -> PlatformError {
    let kind = if error.is_timeout() {
        "timed out"
    } else if error.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    PlatformError::Network(format!("{} {}: {}", context, kind, error))
}

/// Check the status and decode a JSON body
///
/// Non-2xx responses become [`PlatformError::Protocol`] with the raw body kept
/// as diagnostic context.
pub(crate) async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
    context: &str,
) -> Result<T, PlatformError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| network_error(e, context))?;

    if !status.is_success() {
        return Err(PlatformError::Protocol {
            status: status.as_u16(),
            body,
        });
    }

    decode_body(&body, context)
}

pub(crate) fn decode_body<T: DeserializeOwned>(body: &str, context: &str) -> Result<T, PlatformError> {
    serde_json::from_str(body)
        .map_err(|e| PlatformError::InvalidResponse(format!("{}: {} (body: {})", context, e, body)))
}

pub(crate) fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.jpg".to_string())
}

/// Read `path` into a multipart file part
pub(crate) async fn file_part(path: &Path) -> Result<Part, PlatformError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PlatformError::Io(format!("{}: {}", path.display(), e)))?;

    Part::bytes(bytes)
        .file_name(file_name(path))
        .mime_str(mime_for(path))
        .map_err(|e| PlatformError::Io(format!("{}: {}", path.display(), e)))
}
