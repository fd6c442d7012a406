//! In-process fakes shared by the unit tests.

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use trainhq_model::{ArtifactUrls, Job, JobId, JobStatus, RawStatusEntry};

use crate::archive::ArchiveProvider;
use crate::artifacts::ArtifactDownloader;
use crate::device::DeviceIdentity;
use crate::error::{ArchiveError, RemoteServiceError, StoreError};
use crate::hq_client::{HqApi, SubmitPayload};
use crate::store::{JobPatch, JobStore};

/// Fresh directory under the system temp dir.
pub fn scratch_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("trainhq-test-{label}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Serves `app` on an ephemeral local port for the rest of the test.
pub async fn spawn_http(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    jobs: BTreeMap<i64, Job>,
}

impl MemoryInner {
    fn insert(&mut self, dataset_paths: Vec<PathBuf>, status: JobStatus, handle: Option<&str>) -> Job {
        self.next_id += 1;
        let now = Utc::now();
        let job = Job {
            id: JobId(self.next_id),
            dataset_paths,
            status,
            remote_handle: handle.map(str::to_string),
            artifacts: ArtifactUrls::default(),
            created_at: now,
            updated_at: now,
        };
        self.jobs.insert(job.id.0, job.clone());
        job
    }
}

impl MemoryJobStore {
    /// Inserts a job directly in the given state.
    pub fn seed(&self, status: JobStatus, handle: Option<&str>) -> Job {
        let mut inner = self.inner.lock().unwrap();
        let n = inner.next_id + 1;
        inner.insert(vec![PathBuf::from(format!("/data/tub_{n}"))], status, handle)
    }

    pub fn get_sync(&self, id: JobId) -> Option<Job> {
        self.inner.lock().unwrap().jobs.get(&id.0).cloned()
    }

    /// All jobs, oldest first.
    pub fn snapshot(&self) -> Vec<Job> {
        self.inner.lock().unwrap().jobs.values().cloned().collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, dataset_paths: &[PathBuf]) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.insert(dataset_paths.to_vec(), JobStatus::Scheduled, None))
    }

    async fn update(&self, id: JobId, patch: JobPatch) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner.jobs.get_mut(&id.0).ok_or(StoreError::NotFound(id))?;
        patch.apply(job);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.get_sync(id))
    }

    async fn list_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| statuses.contains(&j.status))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        Ok(jobs)
    }

    async fn get_by_handle(&self, handle: &str) -> Result<Option<Job>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .values()
            .find(|j| j.remote_handle.as_deref() == Some(handle))
            .cloned())
    }

    async fn delete(&self, ids: &[JobId]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        for id in ids {
            inner.jobs.remove(&id.0);
        }
        Ok(())
    }
}

/// Parks a fake call until the test opens it.
pub struct Gate {
    entered: Semaphore,
    release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Semaphore::new(0),
            release: Semaphore::new(0),
        })
    }

    /// Resolves once a call is parked at the gate.
    pub async fn wait_entered(&self) {
        self.entered.acquire().await.unwrap().forget();
    }

    pub fn open(&self) {
        self.release.add_permits(1024);
    }

    async fn pass(&self) {
        self.entered.add_permits(1);
        let _permit = self.release.acquire().await.unwrap();
    }
}

pub struct FakeHq {
    handle: String,
    submit_error: Option<RemoteServiceError>,
    fetch_error: Option<RemoteServiceError>,
    gate: Option<Arc<Gate>>,
    panic_on_fetch: bool,
    statuses: Mutex<Vec<RawStatusEntry>>,
    submitted: Mutex<Vec<SubmitPayload>>,
    fetch_calls: Mutex<Vec<Vec<String>>>,
}

impl Default for FakeHq {
    fn default() -> Self {
        Self {
            handle: "19460b57-27fa-4e7d-8a79-9434af0f9629".to_string(),
            submit_error: None,
            fetch_error: None,
            gate: None,
            panic_on_fetch: false,
            statuses: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            fetch_calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeHq {
    pub fn with_handle(mut self, handle: &str) -> Self {
        self.handle = handle.to_string();
        self
    }

    pub fn with_submit_error(mut self, err: RemoteServiceError) -> Self {
        self.submit_error = Some(err);
        self
    }

    pub fn with_fetch_error(mut self, err: RemoteServiceError) -> Self {
        self.fetch_error = Some(err);
        self
    }

    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_fetch = true;
        self
    }

    /// Entries returned by every later `fetch_statuses`.
    pub fn set_statuses(&self, entries: Vec<serde_json::Value>) {
        *self.statuses.lock().unwrap() = entries.into_iter().map(RawStatusEntry::from).collect();
    }

    pub fn submitted(&self) -> Vec<SubmitPayload> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> Vec<Vec<String>> {
        self.fetch_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HqApi for FakeHq {
    async fn submit_job(&self, payload: &SubmitPayload) -> Result<String, RemoteServiceError> {
        self.submitted.lock().unwrap().push(payload.clone());
        match &self.submit_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.handle.clone()),
        }
    }

    async fn fetch_statuses(
        &self,
        handles: &[String],
    ) -> Result<Vec<RawStatusEntry>, RemoteServiceError> {
        self.fetch_calls.lock().unwrap().push(handles.to_vec());
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        if self.panic_on_fetch {
            panic!("fake HQ exploded");
        }
        match &self.fetch_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.statuses.lock().unwrap().clone()),
        }
    }
}

type ArchiveFailure = Box<dyn Fn() -> ArchiveError + Send + Sync>;

pub struct FakeArchiver {
    scratch: PathBuf,
    failure: Option<ArchiveFailure>,
    calls: Mutex<Vec<Vec<PathBuf>>>,
}

impl FakeArchiver {
    /// Writes a real placeholder archive into a fresh scratch dir.
    pub fn ok(label: &str) -> Self {
        Self {
            scratch: scratch_dir(label),
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(f: impl Fn() -> ArchiveError + Send + Sync + 'static) -> Self {
        Self {
            scratch: std::env::temp_dir(),
            failure: Some(Box::new(f)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<PathBuf>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArchiveProvider for FakeArchiver {
    async fn generate_archive(&self, paths: &[PathBuf]) -> Result<PathBuf, ArchiveError> {
        self.calls.lock().unwrap().push(paths.to_vec());
        if let Some(failure) = &self.failure {
            return Err(failure());
        }
        let out = self
            .scratch
            .join(format!("tub_archive_{}.tar.gz", uuid::Uuid::new_v4()));
        tokio::fs::write(&out, b"fake-archive").await?;
        Ok(out)
    }
}

pub struct FakeDevice {
    pub mac: Option<String>,
    pub hostname: String,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self {
            mac: Some("b8:27:eb:00:00:01".to_string()),
            hostname: "donkeycar".to_string(),
        }
    }
}

impl DeviceIdentity for FakeDevice {
    fn mac_address(&self) -> Option<String> {
        self.mac.clone()
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }
}

#[derive(Default)]
pub struct RecordingDownloader {
    calls: Mutex<Vec<Job>>,
}

impl RecordingDownloader {
    pub fn calls(&self) -> Vec<Job> {
        self.calls.lock().unwrap().clone()
    }
}

impl ArtifactDownloader for RecordingDownloader {
    fn download_artifacts(&self, job: &Job) {
        self.calls.lock().unwrap().push(job.clone());
    }
}
