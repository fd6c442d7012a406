use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;

const DEFAULT_HQ_BASE_URL: &str = "https://hq.robocarstore.com";
const DEFAULT_DATABASE_URL: &str = "sqlite://./data/trainhq.db?mode=rwc";
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_DOWNLOAD_TIMEOUT_MS: u64 = 15 * 60 * 1000;
const DEFAULT_REFRESH_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub hq_base_url: String,
    pub database_url: String,
    pub model_dir: PathBuf,
    pub movie_dir: PathBuf,
    /// Car app directory; its `myconfig.py` rides along in every archive.
    pub carapp_path: PathBuf,
    pub wlan: String,
    pub device_id_override: Option<String>,
    pub http_timeout: Duration,
    pub download_timeout: Duration,
    /// `None` disables the periodic refresh ticker.
    pub refresh_interval: Option<Duration>,
    pub listen_addr: SocketAddr,
    pub log_dir: Option<PathBuf>,
}

impl AgentConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = env_string("TRAINHQ_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8000".to_string())
            .parse::<SocketAddr>()
            .context("parse TRAINHQ_LISTEN_ADDR")?;

        let refresh_interval = match env_u64("TRAINHQ_REFRESH_INTERVAL_MS") {
            Some(0) => None,
            other => Some(Duration::from_millis(
                other
                    .map(|v| v.clamp(5_000, 60 * 60 * 1000))
                    .unwrap_or(DEFAULT_REFRESH_INTERVAL_MS),
            )),
        };

        Ok(Self {
            hq_base_url: env_string("TRAINHQ_HQ_BASE_URL")
                .unwrap_or_else(|| DEFAULT_HQ_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            database_url: env_string("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            model_dir: env_path("TRAINHQ_MODEL_DIR", "./data/models"),
            movie_dir: env_path("TRAINHQ_MOVIE_DIR", "./data/movies"),
            carapp_path: env_path("TRAINHQ_CARAPP_PATH", "./mycar"),
            wlan: env_string("TRAINHQ_WLAN").unwrap_or_else(|| "wlan0".to_string()),
            device_id_override: env_string("TRAINHQ_DEVICE_ID"),
            http_timeout: Duration::from_millis(
                env_u64("TRAINHQ_HTTP_TIMEOUT_MS")
                    .map(|v| v.clamp(1_000, 10 * 60 * 1000))
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_MS),
            ),
            download_timeout: Duration::from_millis(
                env_u64("TRAINHQ_DOWNLOAD_TIMEOUT_MS")
                    .map(|v| v.clamp(10_000, 60 * 60 * 1000))
                    .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_MS),
            ),
            refresh_interval,
            listen_addr,
            log_dir: env_string("TRAINHQ_LOG_DIR").map(|v| absolutize(PathBuf::from(v))),
        })
    }

    pub fn submit_job_url(&self) -> String {
        format!("{}/train/submit_job", self.hq_base_url)
    }

    pub fn refresh_job_statuses_url(&self) -> String {
        format!("{}/train/refresh_job_statuses", self.hq_base_url)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(name: &str) -> Option<u64> {
    env_string(name).and_then(|v| v.parse::<u64>().ok())
}

fn env_path(name: &str, default: &str) -> PathBuf {
    absolutize(PathBuf::from(
        env_string(name).unwrap_or_else(|| default.to_string()),
    ))
}

fn absolutize(p: PathBuf) -> PathBuf {
    if p.is_absolute() {
        p
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_are_made_absolute() {
        let p = absolutize(PathBuf::from("data/models"));
        assert!(p.is_absolute());
        assert!(p.ends_with("data/models"));

        let abs = PathBuf::from("/var/lib/trainhq");
        assert_eq!(absolutize(abs.clone()), abs);
    }

    #[test]
    fn endpoint_urls_join_base() {
        let cfg = AgentConfig {
            hq_base_url: "http://hq.local:9000".to_string(),
            database_url: "sqlite::memory:".to_string(),
            model_dir: PathBuf::from("/tmp/models"),
            movie_dir: PathBuf::from("/tmp/movies"),
            carapp_path: PathBuf::from("/tmp/mycar"),
            wlan: "wlan0".to_string(),
            device_id_override: None,
            http_timeout: Duration::from_secs(5),
            download_timeout: Duration::from_secs(60),
            refresh_interval: None,
            listen_addr: ([127, 0, 0, 1], 0).into(),
            log_dir: None,
        };
        assert_eq!(cfg.submit_job_url(), "http://hq.local:9000/train/submit_job");
        assert_eq!(
            cfg.refresh_job_statuses_url(),
            "http://hq.local:9000/train/refresh_job_statuses"
        );
    }
}
