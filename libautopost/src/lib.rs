//! Autopost - post one image with one caption to several social platforms
//!
//! This library prepares an image once, publishes it concurrently to Facebook,
//! X and Instagram, and consolidates the per-platform outcomes into a single
//! report.

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod logging;
pub mod platforms;
pub mod poster;
pub mod preparer;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::Credentials;
pub use error::{AutopostError, PlatformError, Result};
pub use events::{Event, EventBus};
pub use poster::{create_platforms, Orchestrator, OrchestratorState, PlatformRegistry};
pub use types::{OverallOutcome, PlatformId, PlatformResult, PostReport, PostRequest};
