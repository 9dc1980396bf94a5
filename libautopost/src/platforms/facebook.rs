//! Facebook Page photo posting via the Graph API
//!
//! A single multipart call to `/{page_id}/photos` carrying the original image,
//! the caption, and the page access token.

use async_trait::async_trait;
use reqwest::multipart::Form;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::GraphConfig;
use crate::credentials::FacebookCredentials;
use crate::error::PlatformError;
use crate::platforms::http::{file_part, network_error, parse_response};
use crate::platforms::Platform;
use crate::preparer::ImageVariant;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::PlatformId;

pub const FACEBOOK_CHARACTER_LIMIT: usize = 63_206;

/// Graph API calls used to post a photo
#[async_trait]
pub trait FacebookApi: Send + Sync {
    /// Upload a photo with its caption, returning the post id
    async fn upload_photo(&self, image: &Path, caption: &str) -> Result<String, PlatformError>;
}

#[derive(Debug, Deserialize)]
struct PhotoResponse {
    post_id: Option<String>,
    id: Option<String>,
}

pub struct GraphFacebookApi {
    client: reqwest::Client,
    endpoint: String,
    credentials: FacebookCredentials,
}

impl GraphFacebookApi {
    pub fn new(client: reqwest::Client, graph: &GraphConfig, credentials: FacebookCredentials) -> Self {
        let endpoint = graph.endpoint(&credentials.page_id, "photos");
        Self {
            client,
            endpoint,
            credentials,
        }
    }
}

#[async_trait]
impl FacebookApi for GraphFacebookApi {
    async fn upload_photo(&self, image: &Path, caption: &str) -> Result<String, PlatformError> {
        let form = Form::new()
            .part("source", file_part(image).await?)
            .text("caption", caption.to_string())
            .text(
                "access_token",
                self.credentials.access_token.expose_secret().to_string(),
            );

        debug!("POST {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error(e, "facebook photo upload"))?;

        let body: PhotoResponse = parse_response(response, "facebook photo upload").await?;
        body.post_id.or(body.id).ok_or_else(|| {
            PlatformError::InvalidResponse("facebook photo upload: no post id in response".to_string())
        })
    }
}

pub struct FacebookClient {
    api: Arc<dyn FacebookApi>,
    retry: RetryPolicy,
}

impl FacebookClient {
    pub fn new(api: Arc<dyn FacebookApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }
}

#[async_trait]
impl Platform for FacebookClient {
    fn id(&self) -> PlatformId {
        PlatformId::Facebook
    }

    fn image_variant(&self) -> ImageVariant {
        ImageVariant::Original
    }

    fn character_limit(&self) -> Option<usize> {
        Some(FACEBOOK_CHARACTER_LIMIT)
    }

    async fn publish_image(&self, image: &Path, caption: &str) -> Result<String, PlatformError> {
        let post_id = with_retry(&self.retry, "facebook/upload_photo", || {
            self.api.upload_photo(image, caption)
        })
        .await?;

        info!("Posted to Facebook: {}", post_id);
        Ok(post_id)
    }
}
