use std::path::PathBuf;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use trainhq_model::{Job, JobId};

use crate::agent::TrainingAgent;
use crate::error::{StoreError, SubmitError, SyncError};

#[derive(Clone)]
pub struct AppState {
    pub agent: TrainingAgent,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    code: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.code,
            Json(ErrorBody {
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Db(_) | StoreError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        let code = match &err {
            SubmitError::EmptyDatasets | SubmitError::Archive(_) => StatusCode::BAD_REQUEST,
            SubmitError::Remote(_) | SubmitError::InvalidHandle(_) => StatusCode::BAD_GATEWAY,
            SubmitError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let code = match &err {
            SyncError::Remote(_) => StatusCode::BAD_GATEWAY,
            SyncError::Store(_) | SyncError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub model_path: Option<PathBuf>,
    pub movie_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub tub_paths: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct DownloadModelRequest {
    pub job_id: JobId,
}

#[derive(Debug, Deserialize)]
pub struct DeleteJobsRequest {
    pub job_ids: Vec<JobId>,
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
    version: &'static str,
}

async fn healthz() -> Json<HealthzResponse> {
    Json(HealthzResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<JobView>>, ApiError> {
    let jobs = state.agent.list_jobs().await?;
    let views = jobs
        .into_iter()
        .map(|job| JobView {
            model_path: state.agent.model_path(job.id),
            movie_path: state.agent.movie_path(job.id),
            job,
        })
        .collect();
    Ok(Json(views))
}

async fn submit_job(
    State(state): State<AppState>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.agent.submit(&req.tub_paths).await?))
}

async fn refresh_job_status(
    State(state): State<AppState>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let count = state.agent.refresh().await?;
    Ok(Json(RefreshResponse { count }))
}

async fn download_model(
    State(state): State<AppState>,
    Json(req): Json<DownloadModelRequest>,
) -> Result<StatusCode, ApiError> {
    state.agent.download_model(req.job_id).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn delete_jobs(
    State(state): State<AppState>,
    Json(req): Json<DeleteJobsRequest>,
) -> Result<StatusCode, ApiError> {
    state.agent.delete_jobs(&req.job_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router(state: AppState) -> Router {
    let train = Router::new()
        .route("/jobs", get(list_jobs))
        .route("/submit_job", post(submit_job))
        .route("/refresh_job_status", post(refresh_job_status))
        .route("/download_model", post(download_model))
        .route("/delete_jobs", post(delete_jobs));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/train", train)
        .with_state(state)
}
