use std::{path::PathBuf, sync::Arc};

use trainhq_model::{Job, JobId, JobStatus};

use crate::artifacts::ArtifactDownloader;
use crate::error::{StoreError, SubmitError, SyncError};
use crate::status_sync::StatusSyncEngine;
use crate::store::JobStore;
use crate::submission::SubmissionService;

/// The operations the device exposes to its operator.
#[derive(Clone)]
pub struct TrainingAgent {
    store: Arc<dyn JobStore>,
    submission: SubmissionService,
    sync: Arc<StatusSyncEngine>,
    downloader: Arc<dyn ArtifactDownloader>,
}

impl TrainingAgent {
    pub fn new(
        store: Arc<dyn JobStore>,
        submission: SubmissionService,
        sync: Arc<StatusSyncEngine>,
        downloader: Arc<dyn ArtifactDownloader>,
    ) -> Self {
        Self {
            store,
            submission,
            sync,
            downloader,
        }
    }

    pub async fn submit(&self, dataset_paths: &[PathBuf]) -> Result<Job, SubmitError> {
        self.submission.submit(dataset_paths).await
    }

    pub async fn refresh(&self) -> Result<usize, SyncError> {
        self.sync.refresh_all().await
    }

    /// Every job, newest first. Statuses are refreshed first when HQ is
    /// reachable; a failed refresh still lists what is stored.
    pub async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        if let Err(err) = self.sync.refresh_all().await {
            tracing::warn!(%err, "refresh before listing failed");
        }
        self.store.list_by_status(&JobStatus::ALL).await
    }

    /// Starts (again) the artifact download of one job.
    pub async fn download_model(&self, id: JobId) -> Result<Job, StoreError> {
        let job = self.store.get(id).await?.ok_or(StoreError::NotFound(id))?;
        if job.status != JobStatus::Completed {
            tracing::info!(job_id = %id, status = %job.status, "downloading artifacts of unfinished job");
        }
        self.downloader.download_artifacts(&job);
        Ok(job)
    }

    pub async fn delete_jobs(&self, ids: &[JobId]) -> Result<(), StoreError> {
        self.store.delete(ids).await?;
        tracing::info!(count = ids.len(), "deleted jobs");
        Ok(())
    }

    pub fn model_path(&self, id: JobId) -> Option<PathBuf> {
        self.downloader.model_path(id)
    }

    pub fn movie_path(&self, id: JobId) -> Option<PathBuf> {
        self.downloader.movie_path(id)
    }
}
