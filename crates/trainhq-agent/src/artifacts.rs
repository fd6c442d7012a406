use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use futures_util::StreamExt;
use tokio::{io::AsyncWriteExt, sync::mpsc};
use trainhq_model::{ArtifactUrls, Job, JobId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Model,
    AccuracyReport,
    Movie,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Model,
        ArtifactKind::AccuracyReport,
        ArtifactKind::Movie,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Model => "h5",
            ArtifactKind::AccuracyReport => "png",
            ArtifactKind::Movie => "mp4",
        }
    }

    fn url(self, urls: &ArtifactUrls) -> Option<&str> {
        match self {
            ArtifactKind::Model => urls.model_url.as_deref(),
            ArtifactKind::AccuracyReport => urls.model_accuracy_url.as_deref(),
            ArtifactKind::Movie => urls.model_movie_url.as_deref(),
        }
        .map(str::trim)
        .filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    Downloaded { bytes: u64 },
    /// HQ gave no URL for this artifact.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ArtifactReport {
    pub job_id: JobId,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub outcome: ArtifactOutcome,
}

/// Retrieves the files of a completed job in the background.
///
/// Implementations must return immediately and must never touch the job's
/// status: a failed transfer only shows up in logs and reports.
pub trait ArtifactDownloader: Send + Sync {
    fn download_artifacts(&self, job: &Job);

    /// Local model file of a job, if it has been downloaded.
    fn model_path(&self, _job_id: JobId) -> Option<PathBuf> {
        None
    }

    /// Local preview video of a job, if it has been downloaded.
    fn movie_path(&self, _job_id: JobId) -> Option<PathBuf> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct HttpArtifactDownloader {
    client: reqwest::Client,
    model_dir: PathBuf,
    movie_dir: PathBuf,
    reports: Option<mpsc::UnboundedSender<ArtifactReport>>,
}

impl HttpArtifactDownloader {
    pub fn new(
        model_dir: impl Into<PathBuf>,
        movie_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trainhq-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            model_dir: model_dir.into(),
            movie_dir: movie_dir.into(),
            reports: None,
        })
    }

    /// Every finished transfer is also sent on `tx`.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<ArtifactReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    pub fn artifact_path(&self, job_id: JobId, kind: ArtifactKind) -> PathBuf {
        let dir = match kind {
            ArtifactKind::Movie => &self.movie_dir,
            ArtifactKind::Model | ArtifactKind::AccuracyReport => &self.model_dir,
        };
        dir.join(format!("job_{}.{}", job_id, kind.extension()))
    }
}

pub(crate) fn format_error_chain(err: &anyhow::Error) -> String {
    let mut parts = Vec::<String>::new();
    for cause in err.chain() {
        let s = cause.to_string();
        if s.is_empty() || parts.last() == Some(&s) {
            continue;
        }
        parts.push(s);
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(": ")
    }
}

/// Scratch name next to `target`, unique per transfer so overlapping
/// downloads of one artifact never share a partial file.
fn part_path(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    target.with_file_name(format!("{file_name}.{}.part", uuid::Uuid::new_v4().simple()))
}

async fn fetch_to_file(client: &reqwest::Client, url: &str, target: &Path) -> anyhow::Result<u64> {
    if let Some(dir) = target.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create {}", dir.display()))?;
    }

    let resp = client
        .get(url)
        .send()
        .await
        .context("request artifact")?
        .error_for_status()
        .context("artifact download (status)")?;

    let tmp = part_path(target);
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .with_context(|| format!("create {}", tmp.display()))?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;

    let res: anyhow::Result<()> = async {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("read artifact body chunk")?;
            written = written.saturating_add(chunk.len() as u64);
            file.write_all(&chunk).await.context("write artifact")?;
        }
        file.sync_all().await.context("sync artifact")?;
        Ok(())
    }
    .await;

    if let Err(err) = res {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err);
    }
    tokio::fs::rename(&tmp, target)
        .await
        .with_context(|| format!("move artifact into {}", target.display()))?;
    Ok(written)
}

impl ArtifactDownloader for HttpArtifactDownloader {
    fn download_artifacts(&self, job: &Job) {
        for kind in ArtifactKind::ALL {
            let url = kind.url(&job.artifacts).map(str::to_string);
            let path = self.artifact_path(job.id, kind);
            let client = self.client.clone();
            let reports = self.reports.clone();
            let job_id = job.id;

            tokio::spawn(async move {
                let outcome = match url {
                    None => ArtifactOutcome::Skipped,
                    Some(url) => {
                        tracing::debug!(%job_id, %url, target = %path.display(), "downloading artifact");
                        match fetch_to_file(&client, &url, &path).await {
                            Ok(bytes) => ArtifactOutcome::Downloaded { bytes },
                            Err(err) => ArtifactOutcome::Failed(format_error_chain(&err)),
                        }
                    }
                };

                match &outcome {
                    ArtifactOutcome::Downloaded { bytes } => {
                        tracing::info!(%job_id, ?kind, bytes, path = %path.display(), "artifact downloaded");
                    }
                    ArtifactOutcome::Skipped => {
                        tracing::debug!(%job_id, ?kind, "no URL for artifact");
                    }
                    ArtifactOutcome::Failed(error) => {
                        tracing::warn!(%job_id, ?kind, %error, "artifact download failed");
                    }
                }

                if let Some(tx) = reports {
                    let _ = tx.send(ArtifactReport {
                        job_id,
                        kind,
                        path,
                        outcome,
                    });
                }
            });
        }
    }

    fn model_path(&self, job_id: JobId) -> Option<PathBuf> {
        let p = self.artifact_path(job_id, ArtifactKind::Model);
        p.is_file().then_some(p)
    }

    fn movie_path(&self, job_id: JobId) -> Option<PathBuf> {
        let p = self.artifact_path(job_id, ArtifactKind::Movie);
        p.is_file().then_some(p)
    }
}
