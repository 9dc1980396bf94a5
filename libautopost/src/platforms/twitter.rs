//! X (Twitter) posting: media upload followed by post creation
//!
//! Both calls are signed with OAuth 1.0a user context. The upload goes to the
//! v1.1 media endpoint and the post is created through the v2 API referencing
//! the returned `media_id_string`.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::Form;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::TwitterConfig;
use crate::credentials::TwitterCredentials;
use crate::error::PlatformError;
use crate::platforms::http::{file_part, network_error, parse_response};
use crate::platforms::oauth::OAuth1Signer;
use crate::platforms::Platform;
use crate::preparer::ImageVariant;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::PlatformId;

pub const X_CHARACTER_LIMIT: usize = 280;

#[async_trait]
pub trait TwitterApi: Send + Sync {
    /// Upload image bytes, returning the media id
    async fn upload_media(&self, image: &Path) -> Result<String, PlatformError>;

    /// Create a post with `text` attaching `media_id`, returning the post id
    async fn create_tweet(&self, text: &str, media_id: &str) -> Result<String, PlatformError>;
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    media_id_string: String,
}

#[derive(Debug, Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

pub struct HttpTwitterApi {
    client: reqwest::Client,
    config: TwitterConfig,
    signer: OAuth1Signer,
}

impl HttpTwitterApi {
    pub fn new(client: reqwest::Client, config: &TwitterConfig, credentials: &TwitterCredentials) -> Self {
        Self {
            client,
            config: config.clone(),
            signer: OAuth1Signer::from_credentials(credentials),
        }
    }
}

#[async_trait]
impl TwitterApi for HttpTwitterApi {
    async fn upload_media(&self, image: &Path) -> Result<String, PlatformError> {
        let url = &self.config.upload_url;
        let form = Form::new().part("media", file_part(image).await?);
        let authorization = self.signer.authorization_header("POST", url, &[])?;

        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, authorization)
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error(e, "x media upload"))?;

        let body: MediaResponse = parse_response(response, "x media upload").await?;
        Ok(body.media_id_string)
    }

    async fn create_tweet(&self, text: &str, media_id: &str) -> Result<String, PlatformError> {
        let url = &self.config.tweet_url;
        let payload = json!({
            "text": text,
            "media": { "media_ids": [media_id] },
        });
        let authorization = self.signer.authorization_header("POST", url, &[])?;

        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, authorization)
            .json(&payload)
            .send()
            .await
            .map_err(|e| network_error(e, "x post creation"))?;

        let body: TweetResponse = parse_response(response, "x post creation").await?;
        Ok(body.data.id)
    }
}

pub struct TwitterClient {
    api: Arc<dyn TwitterApi>,
    retry: RetryPolicy,
}

impl TwitterClient {
    pub fn new(api: Arc<dyn TwitterApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }
}

#[async_trait]
impl Platform for TwitterClient {
    fn id(&self) -> PlatformId {
        PlatformId::X
    }

    fn image_variant(&self) -> ImageVariant {
        ImageVariant::Compressed
    }

    fn character_limit(&self) -> Option<usize> {
        Some(X_CHARACTER_LIMIT)
    }

    async fn publish_image(&self, image: &Path, caption: &str) -> Result<String, PlatformError> {
        let media_id = with_retry(&self.retry, "x/upload_media", || self.api.upload_media(image)).await?;
        debug!("Uploaded media to X: {}", media_id);

        let tweet_id = with_retry(&self.retry, "x/create_tweet", || {
            self.api.create_tweet(caption, &media_id)
        })
        .await?;

        info!("Posted to X: {}", tweet_id);
        Ok(tweet_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{ScriptedApi, X_CREATE_TWEET, X_UPLOAD_MEDIA};
    use std::time::Duration;

    fn client(api: &ScriptedApi) -> TwitterClient {
        TwitterClient::new(
            Arc::new(api.clone()),
            RetryPolicy::new(3, Duration::from_secs(2)),
        )
    }

    #[test]
    fn test_response_shapes() {
        let media: MediaResponse =
            serde_json::from_str(r#"{"media_id":710511363345354753,"media_id_string":"710511363345354753"}"#)
                .unwrap();
        assert_eq!(media.media_id_string, "710511363345354753");

        let tweet: TweetResponse =
            serde_json::from_str(r#"{"data":{"id":"1445880548472328192","text":"hi"}}"#).unwrap();
        assert_eq!(tweet.data.id, "1445880548472328192");
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_chains_media_id_into_tweet() {
        let api = ScriptedApi::new();
        let id = client(&api)
            .publish_image(Path::new("/tmp/autopost-1.jpg"), "Gempa M5.2")
            .await
            .unwrap();

        assert_eq!(id, api.post_id(X_CREATE_TWEET));
        assert_eq!(api.calls(X_UPLOAD_MEDIA), 1);
        assert_eq!(api.calls(X_CREATE_TWEET), 1);
        assert_eq!(api.media_ids(), vec![api.post_id(X_UPLOAD_MEDIA)]);
        assert_eq!(api.captions(X_CREATE_TWEET), vec!["Gempa M5.2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_skips_tweet_creation() {
        let api = ScriptedApi::new();
        api.fail_step(X_UPLOAD_MEDIA, PlatformError::Network("timed out".to_string()));

        let err = client(&api)
            .publish_image(Path::new("quake.jpg"), "caption")
            .await
            .unwrap_err();

        assert_eq!(err, PlatformError::Network("timed out".to_string()));
        assert_eq!(api.calls(X_UPLOAD_MEDIA), 3);
        assert_eq!(api.calls(X_CREATE_TWEET), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_retry_independently() {
        let api = ScriptedApi::new();
        api.fail_step_times(X_UPLOAD_MEDIA, PlatformError::Network("reset".to_string()), 2);
        api.fail_step_times(
            X_CREATE_TWEET,
            PlatformError::Protocol {
                status: 503,
                body: "over capacity".to_string(),
            },
            2,
        );

        let result = client(&api).publish_image(Path::new("quake.jpg"), "caption").await;

        assert!(result.is_ok());
        assert_eq!(api.calls(X_UPLOAD_MEDIA), 3);
        assert_eq!(api.calls(X_CREATE_TWEET), 3);
    }

    #[test]
    fn test_uses_compressed_image() {
        let client = client(&ScriptedApi::new());
        assert_eq!(client.image_variant(), ImageVariant::Compressed);
        assert!(client.validate_caption(&"a".repeat(280)).is_ok());
        assert!(client.validate_caption(&"a".repeat(281)).is_err());
    }
}
