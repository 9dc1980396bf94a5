//! Image relay: turns a local file into a publicly reachable URL
//!
//! Instagram's Graph API only accepts images by URL, so the compressed JPEG is
//! first pushed to ImageKit and the returned URL is handed to the container
//! step.

use async_trait::async_trait;
use reqwest::multipart::Form;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::config::RelayConfig;
use crate::credentials::RelayCredentials;
use crate::error::PlatformError;
use crate::platforms::http::{file_name, file_part, network_error, parse_response};

#[async_trait]
pub trait ImageRelay: Send + Sync {
    /// Upload `image`, returning its public URL
    async fn upload(&self, image: &Path) -> Result<String, PlatformError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    url: String,
    #[serde(default)]
    file_id: Option<String>,
}

pub struct ImageKitRelay {
    client: reqwest::Client,
    config: RelayConfig,
    credentials: RelayCredentials,
}

impl ImageKitRelay {
    pub fn new(client: reqwest::Client, config: &RelayConfig, credentials: RelayCredentials) -> Self {
        Self {
            client,
            config: config.clone(),
            credentials,
        }
    }
}

#[async_trait]
impl ImageRelay for ImageKitRelay {
    async fn upload(&self, image: &Path) -> Result<String, PlatformError> {
        let mut form = Form::new()
            .part("file", file_part(image).await?)
            .text("fileName", file_name(image))
            .text("isPrivateFile", "false");
        if let Some(folder) = &self.config.folder {
            form = form.text("folder", folder.clone());
        }

        debug!("POST {}", self.config.upload_url);
        let response = self
            .client
            .post(&self.config.upload_url)
            .basic_auth(self.credentials.private_key.expose_secret(), Some(""))
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error(e, "relay upload"))?;

        let body: UploadResponse = parse_response(response, "relay upload").await?;
        if let Some(file_id) = &body.file_id {
            debug!("Relay stored {} as {}", file_name(image), file_id);
        }
        Ok(body.url)
    }
}
