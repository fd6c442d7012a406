use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::{
    StatusCode,
    multipart::{Form, Part},
};
use trainhq_model::RawStatusEntry;

use crate::config::AgentConfig;
use crate::error::{MAX_DIAGNOSTIC_BYTES, RemoteServiceError};

/// Everything HQ needs to schedule a training run for this device.
#[derive(Debug, Clone)]
pub struct SubmitPayload {
    pub device_id: Option<String>,
    pub hostname: String,
    pub software_version: Option<String>,
    pub archive_path: PathBuf,
}

/// The two remote operations the engine depends on.
#[async_trait]
pub trait HqApi: Send + Sync {
    /// Uploads the archive and returns HQ's job handle exactly as received.
    async fn submit_job(&self, payload: &SubmitPayload) -> Result<String, RemoteServiceError>;

    /// Fetches the current status of every handle in a single round trip.
    async fn fetch_statuses(
        &self,
        handles: &[String],
    ) -> Result<Vec<RawStatusEntry>, RemoteServiceError>;
}

#[derive(Debug, Clone)]
pub struct HqClient {
    client: reqwest::Client,
    submit_url: String,
    statuses_url: String,
}

#[derive(Debug, serde::Serialize)]
struct StatusRequest<'a> {
    job_uuids: &'a [String],
}

#[derive(Debug, serde::Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    job_uuid: Option<String>,
}

impl HqClient {
    pub fn new(config: &AgentConfig) -> Result<Self, reqwest::Error> {
        Self::with_endpoints(
            config.submit_job_url(),
            config.refresh_job_statuses_url(),
            config.http_timeout,
        )
    }

    pub fn with_endpoints(
        submit_url: impl Into<String>,
        statuses_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trainhq-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            submit_url: submit_url.into(),
            statuses_url: statuses_url.into(),
        })
    }

    async fn archive_part(path: &Path) -> Result<Part, RemoteServiceError> {
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            RemoteServiceError::new(None, format!("open archive {}: {e}", path.display()))
        })?;
        let len = file
            .metadata()
            .await
            .map_err(|e| {
                RemoteServiceError::new(None, format!("stat archive {}: {e}", path.display()))
            })?
            .len();

        Part::stream_with_length(reqwest::Body::from(file), len)
            .file_name("file.tar.gz")
            .mime_str("application/gzip")
            .map_err(|e| RemoteServiceError::transport("build archive part", e))
    }
}

/// Reads at most `max` bytes of the body; the rest is never buffered.
async fn read_capped(mut resp: reqwest::Response, max: usize) -> String {
    let mut buf = Vec::new();
    while buf.len() < max {
        match resp.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(max - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            _ => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn error_from_response(context: &str, resp: reqwest::Response) -> RemoteServiceError {
    let status = resp.status();
    let body = read_capped(resp, MAX_DIAGNOSTIC_BYTES).await;
    RemoteServiceError::new(
        Some(status.as_u16()),
        format!("{context} returned {status}: {}", body.trim()),
    )
}

#[async_trait]
impl HqApi for HqClient {
    async fn submit_job(&self, payload: &SubmitPayload) -> Result<String, RemoteServiceError> {
        let mut form = Form::new();
        if let Some(device_id) = &payload.device_id {
            form = form.text("device_id", device_id.clone());
        }
        form = form.text("hostname", payload.hostname.clone());
        if let Some(version) = &payload.software_version {
            form = form.text("donkeycar_version", version.clone());
        }
        form = form.part(
            "tub_archive_file",
            Self::archive_part(&payload.archive_path).await?,
        );

        tracing::debug!(url = %self.submit_url, archive = %payload.archive_path.display(), "posting job to HQ");
        let resp = self
            .client
            .post(&self.submit_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RemoteServiceError::transport("submit_job", e))?;

        if resp.status() != StatusCode::OK {
            return Err(error_from_response("submit_job", resp).await);
        }

        let body = resp.json::<SubmitResponse>().await.map_err(|e| {
            RemoteServiceError::new(Some(200), format!("parse submit_job response: {e}"))
        })?;
        body.job_uuid
            .ok_or_else(|| RemoteServiceError::new(Some(200), "submit_job response has no job_uuid"))
    }

    async fn fetch_statuses(
        &self,
        handles: &[String],
    ) -> Result<Vec<RawStatusEntry>, RemoteServiceError> {
        tracing::debug!(url = %self.statuses_url, count = handles.len(), "requesting job statuses from HQ");
        let resp = self
            .client
            .post(&self.statuses_url)
            .json(&StatusRequest { job_uuids: handles })
            .send()
            .await
            .map_err(|e| RemoteServiceError::transport("refresh_job_statuses", e))?;

        if !resp.status().is_success() {
            return Err(error_from_response("refresh_job_statuses", resp).await);
        }

        let status = resp.status().as_u16();
        resp.json::<Vec<RawStatusEntry>>().await.map_err(|e| {
            RemoteServiceError::new(
                Some(status),
                format!("parse refresh_job_statuses response: {e}"),
            )
        })
    }
}
