//! Mock platforms for testing
//!
//! Two kinds of fakes live here:
//!
//! - [`MockPlatform`] stands in for a whole platform behind the [`Platform`]
//!   trait and is used to exercise the orchestrator (fan-out, isolation,
//!   artifact lifetime) without any protocol logic.
//! - [`ScriptedApi`] implements every step API trait at once, so the real
//!   platform clients can be driven through their protocols with scripted
//!   failures and every call recorded.
//!
//! Neither touches the network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::PlatformError;
use crate::platforms::facebook::FacebookApi;
use crate::platforms::instagram::InstagramApi;
use crate::platforms::relay::ImageRelay;
use crate::platforms::twitter::TwitterApi;
use crate::platforms::Platform;
use crate::preparer::ImageVariant;
use crate::types::PlatformId;

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub id: PlatformId,

    /// What `publish_image` returns
    pub outcome: Result<String, PlatformError>,

    /// Which image copy the platform asks for
    pub image_variant: ImageVariant,

    /// Delay before completing (simulates network latency)
    pub delay: Duration,

    /// Panic instead of returning
    pub panics: bool,

    pub character_limit: Option<usize>,

    /// Number of times publish_image has been called
    pub publish_call_count: Arc<Mutex<usize>>,

    /// Image paths received, with whether the file existed at that moment
    pub seen_images: Arc<Mutex<Vec<(PathBuf, bool)>>>,

    /// Captions received
    pub captions: Arc<Mutex<Vec<String>>>,
}

impl MockConfig {
    pub fn new(id: PlatformId) -> Self {
        Self {
            id,
            outcome: Ok(format!("mock-{}-post", id.as_str())),
            image_variant: ImageVariant::Compressed,
            delay: Duration::ZERO,
            panics: false,
            character_limit: None,
            publish_call_count: Arc::new(Mutex::new(0)),
            seen_images: Arc::new(Mutex::new(Vec::new())),
            captions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
///
/// Clones share their call counters, so a test can keep one handle while the
/// orchestrator owns the other.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform that always succeeds
    pub fn success(id: PlatformId) -> Self {
        Self::new(MockConfig::new(id))
    }

    /// Create a mock platform that always fails with `error`
    pub fn failure(id: PlatformId, error: PlatformError) -> Self {
        Self::new(MockConfig {
            outcome: Err(error),
            ..MockConfig::new(id)
        })
    }

    /// Create a mock platform that succeeds after `delay`
    pub fn with_delay(id: PlatformId, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(id)
        })
    }

    /// Create a mock platform whose task panics
    pub fn panicking(id: PlatformId) -> Self {
        Self::new(MockConfig {
            panics: true,
            ..MockConfig::new(id)
        })
    }

    pub fn with_variant(mut self, variant: ImageVariant) -> Self {
        self.config.image_variant = variant;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.config.character_limit = Some(limit);
        self
    }

    /// Get the number of times publish_image was called
    pub fn publish_call_count(&self) -> usize {
        *self.config.publish_call_count.lock().unwrap()
    }

    pub fn seen_images(&self) -> Vec<(PathBuf, bool)> {
        self.config.seen_images.lock().unwrap().clone()
    }

    pub fn captions(&self) -> Vec<String> {
        self.config.captions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn id(&self) -> PlatformId {
        self.config.id
    }

    fn image_variant(&self) -> ImageVariant {
        self.config.image_variant
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }

    async fn publish_image(&self, image: &Path, caption: &str) -> Result<String, PlatformError> {
        *self.config.publish_call_count.lock().unwrap() += 1;
        self.config
            .seen_images
            .lock()
            .unwrap()
            .push((image.to_path_buf(), image.exists()));
        self.config.captions.lock().unwrap().push(caption.to_string());

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.panics {
            panic!("mock {} platform panicked", self.config.id);
        }

        self.config.outcome.clone()
    }
}

pub const FACEBOOK_UPLOAD_PHOTO: &str = "facebook/upload_photo";
pub const X_UPLOAD_MEDIA: &str = "x/upload_media";
pub const X_CREATE_TWEET: &str = "x/create_tweet";
pub const RELAY_UPLOAD: &str = "relay/upload";
pub const INSTAGRAM_CREATE_CONTAINER: &str = "instagram/create_container";
pub const INSTAGRAM_PUBLISH_CONTAINER: &str = "instagram/publish_container";

#[derive(Debug)]
struct ScriptedFailure {
    error: PlatformError,
    /// `None` fails forever
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct ScriptState {
    failures: HashMap<&'static str, ScriptedFailure>,
    calls: HashMap<&'static str, usize>,
    log: Vec<&'static str>,
    images: HashMap<&'static str, Vec<(PathBuf, bool)>>,
    captions: HashMap<&'static str, Vec<String>>,
    media_ids: Vec<String>,
    image_urls: Vec<String>,
    creation_ids: Vec<String>,
}

/// Scripted implementation of every platform step API
///
/// Steps succeed by default and return [`ScriptedApi::post_id`] for their
/// name. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedApi {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `step` fail with `error`
    pub fn fail_step(&self, step: &'static str, error: PlatformError) {
        self.state.lock().unwrap().failures.insert(
            step,
            ScriptedFailure {
                error,
                remaining: None,
            },
        );
    }

    /// Make the next `times` calls to `step` fail with `error`
    pub fn fail_step_times(&self, step: &'static str, error: PlatformError, times: usize) {
        self.state.lock().unwrap().failures.insert(
            step,
            ScriptedFailure {
                error,
                remaining: Some(times),
            },
        );
    }

    /// The id a successful call to `step` returns
    pub fn post_id(&self, step: &str) -> String {
        format!("scripted-{}", step.replace('/', "-"))
    }

    pub fn calls(&self, step: &str) -> usize {
        self.state.lock().unwrap().calls.get(step).copied().unwrap_or(0)
    }

    /// Every step invoked, in order
    pub fn step_log(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn images(&self, step: &str) -> Vec<PathBuf> {
        self.image_records(step).into_iter().map(|(p, _)| p).collect()
    }

    /// Whether the image file existed at each call to `step`
    pub fn images_existed(&self, step: &str) -> Vec<bool> {
        self.image_records(step).into_iter().map(|(_, e)| e).collect()
    }

    pub fn captions(&self, step: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .captions
            .get(step)
            .cloned()
            .unwrap_or_default()
    }

    /// Media ids passed to tweet creation
    pub fn media_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().media_ids.clone()
    }

    /// Image URLs passed to container creation
    pub fn image_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().image_urls.clone()
    }

    /// Creation ids passed to publish
    pub fn creation_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().creation_ids.clone()
    }

    fn image_records(&self, step: &str) -> Vec<(PathBuf, bool)> {
        self.state
            .lock()
            .unwrap()
            .images
            .get(step)
            .cloned()
            .unwrap_or_default()
    }

    fn record_image(&self, step: &'static str, image: &Path) {
        self.state
            .lock()
            .unwrap()
            .images
            .entry(step)
            .or_default()
            .push((image.to_path_buf(), image.exists()));
    }

    fn record_caption(&self, step: &'static str, caption: &str) {
        self.state
            .lock()
            .unwrap()
            .captions
            .entry(step)
            .or_default()
            .push(caption.to_string());
    }

    fn step(&self, step: &'static str) -> Result<String, PlatformError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(step).or_insert(0) += 1;
        state.log.push(step);

        if let Some(failure) = state.failures.get_mut(step) {
            match failure.remaining {
                None => return Err(failure.error.clone()),
                Some(n) if n > 0 => {
                    failure.remaining = Some(n - 1);
                    return Err(failure.error.clone());
                }
                Some(_) => {}
            }
        }

        Ok(self.post_id(step))
    }
}

#[async_trait]
impl FacebookApi for ScriptedApi {
    async fn upload_photo(&self, image: &Path, caption: &str) -> Result<String, PlatformError> {
        self.record_image(FACEBOOK_UPLOAD_PHOTO, image);
        self.record_caption(FACEBOOK_UPLOAD_PHOTO, caption);
        self.step(FACEBOOK_UPLOAD_PHOTO)
    }
}

#[async_trait]
impl TwitterApi for ScriptedApi {
    async fn upload_media(&self, image: &Path) -> Result<String, PlatformError> {
        self.record_image(X_UPLOAD_MEDIA, image);
        self.step(X_UPLOAD_MEDIA)
    }

    async fn create_tweet(&self, text: &str, media_id: &str) -> Result<String, PlatformError> {
        self.record_caption(X_CREATE_TWEET, text);
        self.state.lock().unwrap().media_ids.push(media_id.to_string());
        self.step(X_CREATE_TWEET)
    }
}

#[async_trait]
impl ImageRelay for ScriptedApi {
    async fn upload(&self, image: &Path) -> Result<String, PlatformError> {
        self.record_image(RELAY_UPLOAD, image);
        self.step(RELAY_UPLOAD)
    }
}

#[async_trait]
impl InstagramApi for ScriptedApi {
    async fn create_container(&self, image_url: &str, caption: &str) -> Result<String, PlatformError> {
        self.record_caption(INSTAGRAM_CREATE_CONTAINER, caption);
        self.state.lock().unwrap().image_urls.push(image_url.to_string());
        self.step(INSTAGRAM_CREATE_CONTAINER)
    }

    async fn publish_container(&self, creation_id: &str) -> Result<String, PlatformError> {
        self.state
            .lock()
            .unwrap()
            .creation_ids
            .push(creation_id.to_string());
        self.step(INSTAGRAM_PUBLISH_CONTAINER)
    }
}
