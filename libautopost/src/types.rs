//! Core types for Autopost

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AutopostError, PlatformError, Result};

/// Social platforms a post can be published to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    Facebook,
    X,
    Instagram,
}

impl PlatformId {
    pub const ALL: [PlatformId; 3] = [PlatformId::Facebook, PlatformId::X, PlatformId::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::X => "x",
            Self::Instagram => "instagram",
        }
    }

    /// Human-facing name used in report lines
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Facebook => "Facebook",
            Self::X => "X",
            Self::Instagram => "Instagram",
        }
    }
}

impl FromStr for PlatformId {
    type Err = AutopostError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "facebook" | "fb" => Ok(Self::Facebook),
            "x" | "twitter" => Ok(Self::X),
            "instagram" | "ig" => Ok(Self::Instagram),
            other => Err(AutopostError::InvalidInput(format!(
                "Unknown platform '{}'. Valid options: facebook, x, instagram",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a comma-separated platform list such as `"facebook,x"`.
pub fn parse_platform_list(list: &str) -> Result<BTreeSet<PlatformId>> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(PlatformId::from_str)
        .collect()
}

/// One image plus one caption, addressed to a set of platforms
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub id: String,
    pub image_path: PathBuf,
    pub caption: String,
    pub targets: BTreeSet<PlatformId>,
}

impl PostRequest {
    /// Build a request; the caption is trimmed.
    pub fn new(
        image_path: impl Into<PathBuf>,
        caption: impl AsRef<str>,
        targets: impl IntoIterator<Item = PlatformId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            image_path: image_path.into(),
            caption: caption.as_ref().trim().to_string(),
            targets: targets.into_iter().collect(),
        }
    }

    /// Reject requests that could never be published anywhere
    pub fn validate(&self) -> Result<()> {
        if self.image_path.as_os_str().is_empty() {
            return Err(AutopostError::InvalidInput(
                "Please select an image".to_string(),
            ));
        }
        if self.caption.is_empty() {
            return Err(AutopostError::InvalidInput(
                "Please enter a caption".to_string(),
            ));
        }
        if self.targets.is_empty() {
            return Err(AutopostError::InvalidInput(
                "No target platforms selected".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of publishing to a single platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlatformOutcome {
    Success { post_id: String },
    Failure {
        #[serde(serialize_with = "serialize_reason")]
        error: PlatformError,
    },
}

fn serialize_reason<S: serde::Serializer>(
    error: &PlatformError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

/// Result of posting to a single platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformResult {
    pub platform: PlatformId,
    #[serde(flatten)]
    pub outcome: PlatformOutcome,
    /// Unix timestamp at which the platform's unit finished
    pub completed_at: i64,
}

impl PlatformResult {
    pub fn success(platform: PlatformId, post_id: impl Into<String>) -> Self {
        Self {
            platform,
            outcome: PlatformOutcome::Success {
                post_id: post_id.into(),
            },
            completed_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn failure(platform: PlatformId, error: PlatformError) -> Self {
        Self {
            platform,
            outcome: PlatformOutcome::Failure { error },
            completed_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PlatformOutcome::Success { .. })
    }

    pub fn post_id(&self) -> Option<&str> {
        match &self.outcome {
            PlatformOutcome::Success { post_id } => Some(post_id),
            PlatformOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&PlatformError> {
        match &self.outcome {
            PlatformOutcome::Success { .. } => None,
            PlatformOutcome::Failure { error } => Some(error),
        }
    }

    /// Human-readable failure reason
    pub fn reason(&self) -> Option<String> {
        self.error().map(|e| e.to_string())
    }
}

/// Consolidated outcome across all targeted platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallOutcome {
    AllSucceeded,
    PartialFailure,
    TotalFailure,
}

impl OverallOutcome {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a PlatformResult>) -> Self {
        let (mut succeeded, mut failed) = (0usize, 0usize);
        for result in results {
            if result.is_success() {
                succeeded += 1;
            } else {
                failed += 1;
            }
        }

        match (succeeded, failed) {
            (0, _) => OverallOutcome::TotalFailure,
            (_, 0) => OverallOutcome::AllSucceeded,
            _ => OverallOutcome::PartialFailure,
        }
    }
}

impl std::fmt::Display for OverallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallOutcome::AllSucceeded => write!(f, "all succeeded"),
            OverallOutcome::PartialFailure => write!(f, "partial failure"),
            OverallOutcome::TotalFailure => write!(f, "total failure"),
        }
    }
}

/// Report for one orchestration run, built once every platform has reported
#[derive(Debug, Clone, Serialize)]
pub struct PostReport {
    pub request_id: String,
    pub results: BTreeMap<PlatformId, PlatformResult>,
    pub overall: OverallOutcome,
    pub started_at: i64,
    pub finished_at: i64,
}

impl PostReport {
    pub fn new(
        request_id: String,
        results: BTreeMap<PlatformId, PlatformResult>,
        started_at: i64,
    ) -> Self {
        let overall = OverallOutcome::from_results(results.values());
        Self {
            request_id,
            results,
            overall,
            started_at,
            finished_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn get(&self, platform: PlatformId) -> Option<&PlatformResult> {
        self.results.get(&platform)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PlatformResult> {
        self.results.values().filter(|r| !r.is_success())
    }

    /// True when at least one platform failed and every failure was a credential problem
    pub fn only_authentication_failures(&self) -> bool {
        let mut failures = self.failures().peekable();
        failures.peek().is_some()
            && failures.all(|r| matches!(r.error(), Some(PlatformError::Authentication(_))))
    }
}
