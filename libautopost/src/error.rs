//! Error types for Autopost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AutopostError>;

#[derive(Error, Debug)]
pub enum AutopostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A post is already in flight; wait for it to finish before submitting another")]
    Busy,
}

impl AutopostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AutopostError::InvalidInput(_) => 3,
            AutopostError::Busy => 4,
            AutopostError::Platform(PlatformError::Authentication(_)) => 2,
            AutopostError::Platform(_) => 1,
            AutopostError::Config(_) => 1,
            AutopostError::Image(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Failures of the image preparation step.
///
/// These are fatal for a request: no platform is contacted once one occurs.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("Failed to encode {path}: {reason}")]
    Encode { path: String, reason: String },

    #[error("Image IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Protocol { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Failed to read image: {0}")]
    Io(String),

    #[error("relay unavailable: {0}")]
    RelayUnavailable(String),

    #[error("Task crashed: {0}")]
    Crashed(String),
}

impl PlatformError {
    /// Whether a step that failed with this error may be attempted again.
    ///
    /// Only transport failures and non-2xx statuses are retried. A 2xx whose
    /// body cannot be read means the platform accepted the post, so sending it
    /// again would publish a duplicate.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlatformError::Network(_) | PlatformError::Protocol { .. } => true,
            PlatformError::Authentication(_)
            | PlatformError::Validation(_)
            | PlatformError::InvalidResponse(_)
            | PlatformError::Io(_)
            | PlatformError::RelayUnavailable(_)
            | PlatformError::Crashed(_) => false,
        }
    }
}
