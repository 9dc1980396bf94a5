//! Multi-platform posting orchestration
//!
//! The [`Orchestrator`] turns one [`PostRequest`] into one [`PostReport`]:
//! it prepares the image once, fans out one task per target platform, waits
//! for every task, removes the scratch image, and consolidates the results.
//! Platforms are isolated from each other: a failure, a hang that ends in a
//! timeout, or a panic in one task only affects that platform's result.

use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::{AutopostError, PlatformError, Result};
use crate::events::{Event, EventBus, EventReceiver};
use crate::platforms::facebook::{FacebookClient, GraphFacebookApi};
use crate::platforms::http::build_client;
use crate::platforms::instagram::{GraphInstagramApi, InstagramClient};
use crate::platforms::relay::ImageKitRelay;
use crate::platforms::twitter::{HttpTwitterApi, TwitterClient};
use crate::platforms::Platform;
use crate::preparer::{ImagePreparer, PreparedImage};
use crate::retry::RetryPolicy;
use crate::types::{PlatformId, PlatformResult, PostReport, PostRequest};

/// Platform clients by id, plus the reason each missing one is missing
#[derive(Default)]
pub struct PlatformRegistry {
    available: BTreeMap<PlatformId, Arc<dyn Platform>>,
    unavailable: BTreeMap<PlatformId, PlatformError>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, platform: Arc<dyn Platform>) {
        let id = platform.id();
        self.unavailable.remove(&id);
        self.available.insert(id, platform);
    }

    /// Record that `id` cannot be used; posts targeting it fail with `reason`
    pub fn mark_unavailable(&mut self, id: PlatformId, reason: PlatformError) {
        self.available.remove(&id);
        self.unavailable.insert(id, reason);
    }

    pub fn resolve(&self, id: PlatformId) -> std::result::Result<Arc<dyn Platform>, PlatformError> {
        if let Some(platform) = self.available.get(&id) {
            return Ok(Arc::clone(platform));
        }
        Err(self.unavailable.get(&id).cloned().unwrap_or_else(|| {
            PlatformError::Authentication(format!("{} is not configured", id.display_name()))
        }))
    }

    pub fn available(&self) -> impl Iterator<Item = PlatformId> + '_ {
        self.available.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }
}

/// Create platform clients from configuration and credentials
///
/// A platform with incomplete credentials is registered as unavailable rather
/// than failing the whole call. Instagram additionally needs the image relay;
/// without relay credentials it is unavailable with a relay failure.
///
/// # Errors
///
/// Fails only on invalid configuration (retry or HTTP settings).
pub fn create_platforms(config: &Config, credentials: &Credentials) -> Result<PlatformRegistry> {
    let retry = RetryPolicy::from_config(&config.retry)?;
    let client = build_client(config.http.timeout()?)?;
    let mut registry = PlatformRegistry::new();

    match &credentials.facebook {
        Ok(creds) => {
            info!("Creating Facebook platform client");
            let api = GraphFacebookApi::new(client.clone(), &config.graph, creds.clone());
            registry.register(Arc::new(FacebookClient::new(Arc::new(api), retry)));
        }
        Err(e) => {
            debug!("Facebook unavailable: {}", e);
            registry.mark_unavailable(PlatformId::Facebook, e.clone());
        }
    }

    match &credentials.twitter {
        Ok(creds) => {
            info!("Creating X platform client");
            let api = HttpTwitterApi::new(client.clone(), &config.twitter, creds);
            registry.register(Arc::new(TwitterClient::new(Arc::new(api), retry)));
        }
        Err(e) => {
            debug!("X unavailable: {}", e);
            registry.mark_unavailable(PlatformId::X, e.clone());
        }
    }

    match (&credentials.instagram, &credentials.relay) {
        (Ok(creds), Ok(relay_creds)) => {
            info!("Creating Instagram platform client");
            let api = GraphInstagramApi::new(client.clone(), &config.graph, creds.clone());
            let relay = ImageKitRelay::new(client, &config.relay, relay_creds.clone());
            registry.register(Arc::new(InstagramClient::new(
                Arc::new(api),
                Arc::new(relay),
                retry,
            )));
        }
        (Err(e), _) => {
            debug!("Instagram unavailable: {}", e);
            registry.mark_unavailable(PlatformId::Instagram, e.clone());
        }
        (Ok(_), Err(e)) => {
            debug!("Image relay unavailable: {}", e);
            registry.mark_unavailable(
                PlatformId::Instagram,
                PlatformError::RelayUnavailable(e.to_string()),
            );
        }
    }

    if registry.is_empty() {
        warn!("No platforms have complete credentials");
    }

    Ok(registry)
}

/// Lifecycle of a single submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Preparing,
    Dispatching,
    AwaitingResults,
    Reporting,
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Preparing => "preparing",
            OrchestratorState::Dispatching => "dispatching",
            OrchestratorState::AwaitingResults => "awaiting results",
            OrchestratorState::Reporting => "reporting",
        };
        write!(f, "{}", name)
    }
}

/// Holds the orchestrator out of `Idle` until dropped
struct InFlight<'a> {
    state: &'a Mutex<OrchestratorState>,
}

impl InFlight<'_> {
    fn advance(&self, next: OrchestratorState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("Orchestrator {} -> {}", *state, next);
        *state = next;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = OrchestratorState::Idle;
    }
}

/// Coordinates one post across all selected platforms
///
/// # Example
///
/// ```no_run
/// use libautopost::{create_platforms, Config, Credentials, Orchestrator, PlatformId, PostRequest};
/// use libautopost::preparer::ImagePreparer;
///
/// # async fn example() -> libautopost::Result<()> {
/// let config = Config::load()?;
/// let registry = create_platforms(&config, &Credentials::from_env())?;
/// let orchestrator = Orchestrator::new(ImagePreparer::from_config(&config.image), registry);
///
/// let request = PostRequest::new("quake.png", "M5.2 earthquake", PlatformId::ALL);
/// let report = orchestrator.submit(request).await?;
/// println!("{}", report.overall);
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    preparer: ImagePreparer,
    registry: PlatformRegistry,
    events: EventBus,
    state: Mutex<OrchestratorState>,
}

impl Orchestrator {
    pub fn new(preparer: ImagePreparer, registry: PlatformRegistry) -> Self {
        Self::with_event_bus(preparer, registry, EventBus::default())
    }

    pub fn with_event_bus(preparer: ImagePreparer, registry: PlatformRegistry, events: EventBus) -> Self {
        Self {
            preparer,
            registry,
            events,
            state: Mutex::new(OrchestratorState::Idle),
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Post `request` to every target platform and wait for all of them
    ///
    /// The report holds exactly one result per target. Per-platform failures
    /// are reported in it, not returned as errors.
    ///
    /// # Errors
    ///
    /// - [`AutopostError::InvalidInput`] if the request is incomplete
    /// - [`AutopostError::Busy`] if another submission is in flight
    /// - [`AutopostError::Image`] if the image cannot be prepared; no platform
    ///   is contacted in that case
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future before it completes returns the
    /// orchestrator to `Idle` at once. Platform tasks already spawned keep
    /// running to completion, and the scratch image is removed when the last
    /// of them finishes.
    pub async fn submit(&self, request: PostRequest) -> Result<PostReport> {
        request.validate()?;
        let in_flight = self.begin()?;
        let started_at = chrono::Utc::now().timestamp();

        info!(
            "Posting request {} to {} platform(s)",
            request.id,
            request.targets.len()
        );
        self.events.emit(Event::PostingStarted {
            request_id: request.id.clone(),
            platforms: request.targets.iter().copied().collect(),
        });

        let prepared = match self.preparer.prepare_async(&request.image_path).await {
            Ok(prepared) => Arc::new(prepared),
            Err(e) => {
                warn!("Image preparation failed: {}", e);
                self.events.emit(Event::PostingFailed {
                    request_id: request.id.clone(),
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        in_flight.advance(OrchestratorState::Dispatching);
        let mut results = BTreeMap::new();
        let mut spawned = Vec::new();
        let mut handles = Vec::new();

        for &target in &request.targets {
            match self.registry.resolve(target) {
                Ok(platform) => {
                    spawned.push(target);
                    handles.push(tokio::spawn(run_unit(
                        platform,
                        Arc::clone(&prepared),
                        request.caption.clone(),
                        self.events.clone(),
                        request.id.clone(),
                    )));
                }
                Err(e) => {
                    warn!("Skipping {}: {}", target, e);
                    let result = PlatformResult::failure(target, e);
                    self.emit_completed(&request.id, &result);
                    results.insert(target, result);
                }
            }
        }

        in_flight.advance(OrchestratorState::AwaitingResults);
        for (target, joined) in spawned.into_iter().zip(join_all(handles).await) {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!("Task for {} did not complete: {}", target, e);
                    let result = PlatformResult::failure(target, PlatformError::Crashed(e.to_string()));
                    self.emit_completed(&request.id, &result);
                    result
                }
            };
            results.insert(target, result);
        }

        in_flight.advance(OrchestratorState::Reporting);
        let compressed = prepared.compressed().display().to_string();
        match Arc::try_unwrap(prepared) {
            Ok(prepared) => {
                if let Err(e) = prepared.cleanup() {
                    warn!("Failed to remove prepared image {}: {}", compressed, e);
                }
            }
            // Removed on drop by whoever releases it last
            Err(_) => debug!("Prepared image {} still shared", compressed),
        }

        let report = PostReport::new(request.id.clone(), results, started_at);
        info!("Request {} finished: {}", report.request_id, report.overall);
        self.events.emit(Event::PostingCompleted {
            request_id: report.request_id.clone(),
            overall: report.overall,
        });

        Ok(report)
    }

    fn begin(&self) -> Result<InFlight<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != OrchestratorState::Idle {
            warn!("Rejecting submission while {}", *state);
            return Err(AutopostError::Busy);
        }
        *state = OrchestratorState::Preparing;
        Ok(InFlight { state: &self.state })
    }

    fn emit_completed(&self, request_id: &str, result: &PlatformResult) {
        self.events.emit(Event::PlatformCompleted {
            request_id: request_id.to_string(),
            result: result.clone(),
        });
    }
}

/// One platform's unit of work: local caption check, then the protocol
async fn run_unit(
    platform: Arc<dyn Platform>,
    prepared: Arc<PreparedImage>,
    caption: String,
    events: EventBus,
    request_id: String,
) -> PlatformResult {
    let id = platform.id();

    let result = match platform.validate_caption(&caption) {
        Err(e) => {
            warn!("Caption rejected for {}: {}", id, e);
            PlatformResult::failure(id, e)
        }
        Ok(()) => {
            info!("Posting to platform: {}", id);
            let image = prepared.path_for(platform.image_variant());
            match platform.publish_image(image, &caption).await {
                Ok(post_id) => {
                    info!("Successfully posted to {}: {}", id, post_id);
                    PlatformResult::success(id, post_id)
                }
                Err(e) => {
                    warn!("Failed to post to {}: {}", id, e);
                    PlatformResult::failure(id, e)
                }
            }
        }
    };

    events.emit(Event::PlatformCompleted {
        request_id,
        result: result.clone(),
    });
    result
}
