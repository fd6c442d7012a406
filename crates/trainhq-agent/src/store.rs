use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use trainhq_db::entities::train_jobs;
use trainhq_model::{ArtifactUrls, Job, JobId, JobStatus};

use crate::error::StoreError;

/// Field changes applied by [`JobStore::update`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub remote_handle: Option<String>,
    /// Replaces all three artifact URLs at once.
    pub artifacts: Option<ArtifactUrls>,
}

impl JobPatch {
    pub fn remote_handle(handle: impl Into<String>) -> Self {
        Self {
            remote_handle: Some(handle.into()),
            ..Self::default()
        }
    }

    pub fn status_report(status: JobStatus, artifacts: ArtifactUrls) -> Self {
        Self {
            status: Some(status),
            artifacts: Some(artifacts),
            ..Self::default()
        }
    }

    pub fn apply(&self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        // A handle is assigned once and never replaced.
        if job.remote_handle.is_none() {
            if let Some(handle) = &self.remote_handle {
                job.remote_handle = Some(handle.clone());
            }
        }
        if let Some(artifacts) = &self.artifacts {
            job.artifacts = artifacts.clone();
        }
    }
}

/// Durable job records. Each call is applied to a single record atomically.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Creates a SCHEDULED job with no remote handle.
    async fn create(&self, dataset_paths: &[PathBuf]) -> Result<Job, StoreError>;

    async fn update(&self, id: JobId, patch: JobPatch) -> Result<Job, StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Newest first.
    async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError>;

    async fn get_by_handle(&self, handle: &str) -> Result<Option<Job>, StoreError>;

    /// Unknown ids are ignored.
    async fn delete(&self, ids: &[JobId]) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct SeaOrmJobStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmJobStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn job_from_row(row: train_jobs::Model) -> Result<Job, StoreError> {
    let dataset_paths: Vec<PathBuf> = serde_json::from_str(&row.dataset_paths)
        .map_err(|e| StoreError::Corrupt(format!("job {} dataset_paths: {e}", row.id)))?;
    let status = row
        .status
        .parse::<JobStatus>()
        .map_err(|e| StoreError::Corrupt(format!("job {}: {e}", row.id)))?;

    Ok(Job {
        id: JobId(row.id),
        dataset_paths,
        status,
        remote_handle: row.remote_handle,
        artifacts: ArtifactUrls {
            model_url: row.model_url,
            model_accuracy_url: row.model_accuracy_url,
            model_movie_url: row.model_movie_url,
        },
        created_at: row.created_at.with_timezone(&Utc),
        updated_at: row.updated_at.with_timezone(&Utc),
    })
}

#[async_trait]
impl JobStore for SeaOrmJobStore {
    async fn create(&self, dataset_paths: &[PathBuf]) -> Result<Job, StoreError> {
        let paths = serde_json::to_string(dataset_paths)
            .map_err(|e| StoreError::Corrupt(format!("encode dataset_paths: {e}")))?;
        let now = Utc::now();

        let model = train_jobs::ActiveModel {
            dataset_paths: Set(paths),
            status: Set(JobStatus::Scheduled.as_str().to_string()),
            remote_handle: Set(None),
            model_url: Set(None),
            model_accuracy_url: Set(None),
            model_movie_url: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };

        job_from_row(model.insert(&*self.db).await?)
    }

    async fn update(&self, id: JobId, patch: JobPatch) -> Result<Job, StoreError> {
        let row = train_jobs::Entity::find_by_id(id.0)
            .one(&*self.db)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        let mut job = job_from_row(row.clone())?;
        patch.apply(&mut job);

        let mut update: train_jobs::ActiveModel = row.into();
        update.status = Set(job.status.as_str().to_string());
        update.remote_handle = Set(job.remote_handle.clone());
        update.model_url = Set(job.artifacts.model_url.clone());
        update.model_accuracy_url = Set(job.artifacts.model_accuracy_url.clone());
        update.model_movie_url = Set(job.artifacts.model_movie_url.clone());
        update.updated_at = Set(Utc::now().into());

        job_from_row(update.update(&*self.db).await?)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        train_jobs::Entity::find_by_id(id.0)
            .one(&*self.db)
            .await?
            .map(job_from_row)
            .transpose()
    }

    async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        train_jobs::Entity::find()
            .filter(train_jobs::Column::Status.is_in(statuses.iter().map(|s| s.as_str())))
            .order_by_desc(train_jobs::Column::CreatedAt)
            .order_by_desc(train_jobs::Column::Id)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(job_from_row)
            .collect()
    }

    async fn get_by_handle(&self, handle: &str) -> Result<Option<Job>, StoreError> {
        train_jobs::Entity::find()
            .filter(train_jobs::Column::RemoteHandle.eq(handle))
            .one(&*self.db)
            .await?
            .map(job_from_row)
            .transpose()
    }

    async fn delete(&self, ids: &[JobId]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        train_jobs::Entity::delete_many()
            .filter(train_jobs::Column::Id.is_in(ids.iter().map(|id| id.0)))
            .exec(&*self.db)
            .await?;
        Ok(())
    }
}
