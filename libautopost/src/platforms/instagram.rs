//! Instagram Business posting via the Graph API
//!
//! Three steps, each retried on its own:
//!
//! 1. relay the compressed image to a public URL ([`ImageRelay`]);
//! 2. create a media container from that URL and the caption;
//! 3. publish the container.
//!
//! A relay that stays down turns into [`PlatformError::RelayUnavailable`] and
//! the Graph API is never called.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::GraphConfig;
use crate::credentials::InstagramCredentials;
use crate::error::PlatformError;
use crate::platforms::http::{network_error, parse_response};
use crate::platforms::relay::ImageRelay;
use crate::platforms::Platform;
use crate::preparer::ImageVariant;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::PlatformId;

pub const INSTAGRAM_CHARACTER_LIMIT: usize = 2_200;

#[async_trait]
pub trait InstagramApi: Send + Sync {
    /// Create a media container, returning its creation id
    async fn create_container(&self, image_url: &str, caption: &str) -> Result<String, PlatformError>;

    /// Publish a container, returning the media id
    async fn publish_container(&self, creation_id: &str) -> Result<String, PlatformError>;
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

pub struct GraphInstagramApi {
    client: reqwest::Client,
    media_endpoint: String,
    publish_endpoint: String,
    credentials: InstagramCredentials,
}

impl GraphInstagramApi {
    pub fn new(client: reqwest::Client, graph: &GraphConfig, credentials: InstagramCredentials) -> Self {
        Self {
            client,
            media_endpoint: graph.endpoint(&credentials.user_id, "media"),
            publish_endpoint: graph.endpoint(&credentials.user_id, "media_publish"),
            credentials,
        }
    }

    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
        context: &str,
    ) -> Result<String, PlatformError> {
        let token = self.credentials.access_token.expose_secret();
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("access_token", token));

        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| network_error(e, context))?;

        let body: IdResponse = parse_response(response, context).await?;
        Ok(body.id)
    }
}

#[async_trait]
impl InstagramApi for GraphInstagramApi {
    async fn create_container(&self, image_url: &str, caption: &str) -> Result<String, PlatformError> {
        self.post_form(
            &self.media_endpoint,
            &[("image_url", image_url), ("caption", caption)],
            "instagram container",
        )
        .await
    }

    async fn publish_container(&self, creation_id: &str) -> Result<String, PlatformError> {
        self.post_form(
            &self.publish_endpoint,
            &[("creation_id", creation_id)],
            "instagram publish",
        )
        .await
    }
}

pub struct InstagramClient {
    api: Arc<dyn InstagramApi>,
    relay: Arc<dyn ImageRelay>,
    retry: RetryPolicy,
}

impl InstagramClient {
    pub fn new(api: Arc<dyn InstagramApi>, relay: Arc<dyn ImageRelay>, retry: RetryPolicy) -> Self {
        Self { api, relay, retry }
    }
}

#[async_trait]
impl Platform for InstagramClient {
    fn id(&self) -> PlatformId {
        PlatformId::Instagram
    }

    fn image_variant(&self) -> ImageVariant {
        ImageVariant::Compressed
    }

    fn character_limit(&self) -> Option<usize> {
        Some(INSTAGRAM_CHARACTER_LIMIT)
    }

    async fn publish_image(&self, image: &Path, caption: &str) -> Result<String, PlatformError> {
        let image_url = with_retry(&self.retry, "instagram/relay_upload", || self.relay.upload(image))
            .await
            .map_err(|e| {
                warn!("Image relay failed, skipping Instagram: {}", e);
                PlatformError::RelayUnavailable(e.to_string())
            })?;
        debug!("Relayed image to {}", image_url);

        let creation_id = with_retry(&self.retry, "instagram/create_container", || {
            self.api.create_container(&image_url, caption)
        })
        .await?;

        let media_id = with_retry(&self.retry, "instagram/publish_container", || {
            self.api.publish_container(&creation_id)
        })
        .await?;

        info!("Posted to Instagram: {}", media_id);
        Ok(media_id)
    }
}
