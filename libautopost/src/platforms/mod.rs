//! Platform abstraction and implementations
//!
//! Each platform is a [`Platform`] that publishes one image with one caption.
//! Platform clients are split in two layers:
//!
//! - a step API trait per platform ([`facebook::FacebookApi`],
//!   [`twitter::TwitterApi`], [`instagram::InstagramApi`], [`relay::ImageRelay`])
//!   whose methods are single HTTP calls, implemented over `reqwest`;
//! - a client ([`facebook::FacebookClient`], ...) that sequences those steps,
//!   retrying each one independently.
//!
//! # Examples
//!
//! ```no_run
//! use std::path::Path;
//! use libautopost::platforms::Platform;
//!
//! # async fn example(platform: &dyn Platform) {
//! let caption = "M5.2 earthquake, 40 km SW of the coast";
//! if platform.validate_caption(caption).is_ok() {
//!     match platform.publish_image(Path::new("quake.jpg"), caption).await {
//!         Ok(id) => println!("{}: {}", platform.name(), id),
//!         Err(e) => eprintln!("{}: {}", platform.name(), e),
//!     }
//! }
//! # }
//! ```

use async_trait::async_trait;
use std::path::Path;

use crate::error::PlatformError;
use crate::preparer::ImageVariant;
use crate::types::PlatformId;

pub mod facebook;
pub(crate) mod http;
pub mod instagram;
pub mod oauth;
pub mod relay;
pub mod twitter;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

#[async_trait]
pub trait Platform: Send + Sync {
    fn id(&self) -> PlatformId;

    /// Lowercase identifier, e.g. "facebook"
    fn name(&self) -> &str {
        self.id().as_str()
    }

    /// Which copy of the image this platform uploads
    fn image_variant(&self) -> ImageVariant;

    /// Maximum caption length in characters, if the platform has one
    fn character_limit(&self) -> Option<usize>;

    /// Check the caption locally before any network call
    fn validate_caption(&self, caption: &str) -> Result<(), PlatformError> {
        if caption.trim().is_empty() {
            return Err(PlatformError::Validation(
                "Caption cannot be empty".to_string(),
            ));
        }

        if let Some(limit) = self.character_limit() {
            let length = caption.chars().count();
            if length > limit {
                return Err(PlatformError::Validation(format!(
                    "Caption exceeds {}'s {} character limit (current: {} characters)",
                    self.id().display_name(),
                    limit,
                    length
                )));
            }
        }

        Ok(())
    }

    /// Publish `image` with `caption`, returning the platform's post id
    ///
    /// Implementations retry each network step on their own; the error
    /// returned is the one that ended the protocol.
    async fn publish_image(&self, image: &Path, caption: &str) -> Result<String, PlatformError>;
}
