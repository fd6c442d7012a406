use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use trainhq_model::{JobStatus, RawStatusEntry};

use crate::artifacts::ArtifactDownloader;
use crate::error::{StoreError, SyncError};
use crate::hq_client::HqApi;
use crate::store::{JobPatch, JobStore};

/// Brings outstanding jobs in line with what HQ reports.
///
/// At most one refresh pass runs at a time per engine. Construct one engine
/// per process and share it behind an `Arc`.
pub struct StatusSyncEngine {
    store: Arc<dyn JobStore>,
    hq: Arc<dyn HqApi>,
    downloader: Arc<dyn ArtifactDownloader>,
    refresh_in_progress: AtomicBool,
}

/// Holds the single-flight flag for the duration of one pass.
struct RefreshGuard {
    engine: Arc<StatusSyncEngine>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.engine
            .refresh_in_progress
            .store(false, Ordering::Release);
    }
}

impl StatusSyncEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        hq: Arc<dyn HqApi>,
        downloader: Arc<dyn ArtifactDownloader>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            hq,
            downloader,
            refresh_in_progress: AtomicBool::new(false),
        })
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_in_progress.load(Ordering::Acquire)
    }

    fn try_begin(self: &Arc<Self>) -> Option<RefreshGuard> {
        self.refresh_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard {
                engine: self.clone(),
            })
    }

    /// Polls HQ for every outstanding, submitted job and applies the results.
    ///
    /// Returns how many jobs changed. When another pass is already running
    /// this returns `Ok(0)` without touching the store or HQ. The pass runs
    /// on its own task: dropping the returned future stops waiting but does
    /// not cancel it.
    pub async fn refresh_all(self: &Arc<Self>) -> Result<usize, SyncError> {
        let Some(guard) = self.try_begin() else {
            tracing::debug!("status refresh already in progress");
            return Ok(0);
        };

        let pass = tokio::spawn(async move {
            let engine = guard.engine.clone();
            let result = engine.run_pass().await;
            drop(guard);
            result
        });

        match pass.await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(%err, "status refresh task failed");
                Err(SyncError::Aborted(err.to_string()))
            }
        }
    }

    async fn run_pass(&self) -> Result<usize, SyncError> {
        let outstanding = self.store.list_by_status(&JobStatus::OUTSTANDING).await?;

        let mut seen = HashSet::new();
        let handles: Vec<String> = outstanding
            .iter()
            .filter(|job| job.is_pollable())
            .filter_map(|job| job.remote_handle.clone())
            .filter(|handle| seen.insert(handle.clone()))
            .collect();

        if handles.is_empty() {
            tracing::debug!(outstanding = outstanding.len(), "no submitted jobs to refresh");
            return Ok(0);
        }

        // One round trip per pass. A failure here abandons the pass before
        // anything is written.
        let entries = self.hq.fetch_statuses(&handles).await.inspect_err(|err| {
            tracing::warn!(%err, jobs = handles.len(), "failed to fetch job statuses from HQ");
        })?;

        let mut changed = 0usize;
        for entry in &entries {
            if self.apply_entry(entry).await? {
                changed += 1;
            }
        }

        tracing::info!(
            polled = handles.len(),
            returned = entries.len(),
            changed,
            "job status refresh complete"
        );
        Ok(changed)
    }

    /// Returns whether the entry changed a local job.
    async fn apply_entry(&self, entry: &RawStatusEntry) -> Result<bool, SyncError> {
        let result = match entry.parse() {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(%err, entry = %entry.0, "skipping malformed status entry");
                return Ok(false);
            }
        };

        let Some(job) = self.store.get_by_handle(&result.uuid).await? else {
            tracing::debug!(handle = %result.uuid, "no local job for status entry");
            return Ok(false);
        };
        if job.status.is_terminal() {
            tracing::debug!(job_id = %job.id, status = %job.status, "ignoring status for finished job");
            return Ok(false);
        }

        let artifacts = result.artifacts();
        if job.status == result.status && job.artifacts == artifacts {
            return Ok(false);
        }

        let updated = match self
            .store
            .update(job.id, JobPatch::status_report(result.status, artifacts))
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::NotFound(id)) => {
                tracing::warn!(job_id = %id, "job deleted during status refresh");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };
        tracing::info!(job_id = %updated.id, from = %job.status, to = %updated.status, "job status changed");

        if updated.status == JobStatus::Completed {
            self.downloader.download_artifacts(&updated);
        }
        Ok(true)
    }
}
