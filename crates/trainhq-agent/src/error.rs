use std::path::PathBuf;

use thiserror::Error;
use trainhq_model::JobId;

pub(crate) const MAX_DIAGNOSTIC_BYTES: usize = 2 * 1024;

/// Any failed call to HQ: transport error, timeout, non-2xx or an unreadable body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("HQ request failed{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
pub struct RemoteServiceError {
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteServiceError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: truncate_utf8(&message.into(), MAX_DIAGNOSTIC_BYTES),
        }
    }

    pub fn transport(context: &str, err: reqwest::Error) -> Self {
        Self::new(
            err.status().map(|s| s.as_u16()),
            format!("{context}: {err}"),
        )
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("no dataset paths given")]
    EmptyInput,

    #[error("dataset path does not exist: {}", .0.display())]
    MissingPath(PathBuf),

    #[error("archive I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("tar exited with {status}: {stderr}")]
    ToolFailed { status: String, stderr: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("corrupt job row: {0}")]
    Corrupt(String),
}

/// Why a submission did not produce a polled job.
///
/// In every case except `EmptyDatasets` a job row may exist; it stays
/// SCHEDULED with no remote handle and is never polled.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("at least one dataset path is required")]
    EmptyDatasets,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to build dataset archive: {0}")]
    Archive(#[from] ArchiveError),

    #[error("failed to submit job: {0}")]
    Remote(#[from] RemoteServiceError),

    #[error("HQ returned an invalid job handle: {0:?}")]
    InvalidHandle(String),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("status refresh failed: {0}")]
    Remote(#[from] RemoteServiceError),

    #[error("status refresh aborted: {0}")]
    Aborted(String),
}

pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let suffix = "…(truncated)";
    let keep = max_bytes.saturating_sub(suffix.len()).max(1);
    let mut end = keep.min(s.len());
    while end > 0 && !s.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    let mut out = s[..end].to_string();
    out.push_str(suffix);
    out
}
