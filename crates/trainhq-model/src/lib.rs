use std::{fmt, path::PathBuf, str::FromStr};

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Store-assigned job identifier. Also used to name downloaded artifacts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Scheduled,
    Training,
    Completed,
    NoCapacity,
    NoQuota,
    SpotRequestFailed,
    Timeout,
}

impl JobStatus {
    /// Statuses that are still worth asking HQ about.
    pub const OUTSTANDING: [JobStatus; 2] = [JobStatus::Scheduled, JobStatus::Training];

    pub const ALL: [JobStatus; 7] = [
        JobStatus::Scheduled,
        JobStatus::Training,
        JobStatus::Completed,
        JobStatus::NoCapacity,
        JobStatus::NoQuota,
        JobStatus::SpotRequestFailed,
        JobStatus::Timeout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::Training => "TRAINING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::NoCapacity => "NO_CAPACITY",
            JobStatus::NoQuota => "NO_QUOTA",
            JobStatus::SpotRequestFailed => "SPOT_REQUEST_FAILED",
            JobStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn is_outstanding(self) -> bool {
        matches!(self, JobStatus::Scheduled | JobStatus::Training)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_outstanding()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown job status: {0}")]
pub struct UnknownJobStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownJobStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| UnknownJobStatus(s.to_string()))
    }
}

/// Remote locations of the files produced by a completed training run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArtifactUrls {
    pub model_url: Option<String>,
    pub model_accuracy_url: Option<String>,
    pub model_movie_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Job {
    pub id: JobId,
    pub dataset_paths: Vec<PathBuf>,
    pub status: JobStatus,
    /// Job uuid assigned by HQ. `None` until submission succeeds.
    pub remote_handle: Option<String>,
    #[serde(flatten)]
    pub artifacts: ArtifactUrls,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Only submitted, non-terminal jobs are polled.
    pub fn is_pollable(&self) -> bool {
        self.status.is_outstanding() && self.remote_handle.is_some()
    }
}

/// One well-formed entry of HQ's status batch.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StatusResult {
    pub uuid: String,
    pub status: JobStatus,
    #[serde(default)]
    pub model_url: Option<String>,
    #[serde(default)]
    pub model_accuracy_url: Option<String>,
    #[serde(default)]
    pub model_movie_url: Option<String>,
}

impl StatusResult {
    pub fn artifacts(&self) -> ArtifactUrls {
        ArtifactUrls {
            model_url: self.model_url.clone(),
            model_accuracy_url: self.model_accuracy_url.clone(),
            model_movie_url: self.model_movie_url.clone(),
        }
    }
}

/// An entry of HQ's status batch as it came off the wire.
///
/// Entries are parsed one by one so a single malformed entry does not sink
/// the whole batch.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RawStatusEntry(pub serde_json::Value);

impl RawStatusEntry {
    pub fn parse(&self) -> Result<StatusResult, serde_json::Error> {
        StatusResult::deserialize(&self.0)
    }
}

impl From<serde_json::Value> for RawStatusEntry {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}
