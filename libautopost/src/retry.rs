//! Fixed-delay retry for individual protocol steps
//!
//! Every network step of every platform goes through [`with_retry`]. Steps of a
//! multi-step protocol are retried independently, so a step that exhausts its
//! attempts stops the protocol before the next step starts.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::RetryConfig;
use crate::error::{PlatformError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn from_config(config: &RetryConfig) -> Result<Self> {
        Ok(Self::new(config.max_attempts, config.delay()?))
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts
///
/// `label` names the step in logs, e.g. `"x/upload_media"`. The error from the
/// last attempt is returned unchanged.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> std::result::Result<T, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, PlatformError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                    label, attempt, max_attempts, e, policy.delay
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!("{} failed after {} attempts: {}", label, attempt, e);
                }
                return Err(e);
            }
        }
    }
}
