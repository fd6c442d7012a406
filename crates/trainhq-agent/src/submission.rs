use std::{path::PathBuf, sync::Arc};

use trainhq_model::Job;

use crate::archive::ArchiveProvider;
use crate::device::DeviceIdentity;
use crate::error::SubmitError;
use crate::hq_client::{HqApi, SubmitPayload};
use crate::store::{JobPatch, JobStore};

const MAX_HANDLE_LEN: usize = 128;

/// HQ handles are opaque; only reject what cannot be one.
fn is_well_formed_handle(handle: &str) -> bool {
    !handle.is_empty()
        && handle.len() <= MAX_HANDLE_LEN
        && handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Creates job records and hands their datasets to HQ.
#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<dyn JobStore>,
    archiver: Arc<dyn ArchiveProvider>,
    device: Arc<dyn DeviceIdentity>,
    hq: Arc<dyn HqApi>,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn JobStore>,
        archiver: Arc<dyn ArchiveProvider>,
        device: Arc<dyn DeviceIdentity>,
        hq: Arc<dyn HqApi>,
    ) -> Self {
        Self {
            store,
            archiver,
            device,
            hq,
        }
    }

    /// Submits `dataset_paths` as one training job.
    ///
    /// The job row is created before anything can fail remotely. On any
    /// later failure it stays SCHEDULED without a handle and is never
    /// polled; nothing here retries.
    pub async fn submit(&self, dataset_paths: &[PathBuf]) -> Result<Job, SubmitError> {
        if dataset_paths.is_empty() {
            return Err(SubmitError::EmptyDatasets);
        }

        let job = self.store.create(dataset_paths).await?;
        tracing::info!(job_id = %job.id, datasets = dataset_paths.len(), "created training job");

        let archive_path = match self.archiver.generate_archive(dataset_paths).await {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(job_id = %job.id, %err, "archive generation failed");
                return Err(err.into());
            }
        };

        let payload = SubmitPayload {
            device_id: self.device.mac_address(),
            hostname: self.device.hostname(),
            software_version: self.device.software_version(),
            archive_path,
        };
        let result = self.hq.submit_job(&payload).await;

        if let Err(err) = tokio::fs::remove_file(&payload.archive_path).await {
            tracing::debug!(%err, archive = %payload.archive_path.display(), "failed to remove archive");
        }

        let handle = match result {
            Ok(h) => h.trim().to_string(),
            Err(err) => {
                tracing::warn!(job_id = %job.id, %err, "HQ rejected job submission");
                return Err(err.into());
            }
        };
        if !is_well_formed_handle(&handle) {
            tracing::warn!(job_id = %job.id, handle = %handle, "HQ returned a malformed job handle");
            return Err(SubmitError::InvalidHandle(handle));
        }

        let job = self
            .store
            .update(job.id, JobPatch::remote_handle(handle))
            .await?;
        tracing::info!(job_id = %job.id, handle = ?job.remote_handle, "job submitted to HQ");
        Ok(job)
    }
}
