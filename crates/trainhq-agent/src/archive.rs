use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{ArchiveError, truncate_utf8};

/// Packs dataset directories into a single compressed file on disk.
///
/// The returned file is owned by the caller, which removes it once done.
#[async_trait]
pub trait ArchiveProvider: Send + Sync {
    async fn generate_archive(&self, paths: &[PathBuf]) -> Result<PathBuf, ArchiveError>;
}

/// Builds `.tar.gz` archives with the system `tar`, each dataset stored
/// under its own directory name.
#[derive(Debug, Clone)]
pub struct TarArchiver {
    carapp_path: PathBuf,
    scratch_dir: PathBuf,
    /// Relative dataset paths resolve against this; the process cwd if unset.
    base_dir: Option<PathBuf>,
}

impl TarArchiver {
    pub fn new(carapp_path: impl Into<PathBuf>) -> Self {
        Self {
            carapp_path: carapp_path.into(),
            scratch_dir: std::env::temp_dir(),
            base_dir: None,
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Every `-C` handed to tar must be absolute: a relative one is taken
    /// relative to the directory the previous `-C` moved into.
    fn resolve(&self, path: &Path) -> std::io::Result<PathBuf> {
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        let base = match &self.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(base.join(path))
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    fn myconfig(&self) -> Option<PathBuf> {
        let p = self.carapp_path.join("myconfig.py");
        p.is_file().then_some(p)
    }
}

fn split_entry(path: &Path) -> Result<(PathBuf, PathBuf), ArchiveError> {
    let name = path
        .file_name()
        .ok_or_else(|| ArchiveError::MissingPath(path.to_path_buf()))?;
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((parent.to_path_buf(), PathBuf::from(name)))
}

#[async_trait]
impl ArchiveProvider for TarArchiver {
    async fn generate_archive(&self, paths: &[PathBuf]) -> Result<PathBuf, ArchiveError> {
        if paths.is_empty() {
            return Err(ArchiveError::EmptyInput);
        }
        let mut resolved = Vec::with_capacity(paths.len());
        for p in paths {
            let abs = self.resolve(p)?;
            if !tokio::fs::try_exists(&abs).await? {
                return Err(ArchiveError::MissingPath(p.clone()));
            }
            resolved.push(abs);
        }

        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let out = self
            .scratch_dir
            .join(format!("tub_archive_{}.tar.gz", uuid::Uuid::new_v4()));

        let mut cmd = Command::new("tar");
        cmd.arg("-czf").arg(&out);
        for p in &resolved {
            let (parent, name) = split_entry(p)?;
            cmd.arg("-C").arg(parent).arg(name);
        }
        if let Some(myconfig) = self.myconfig() {
            let (parent, name) = split_entry(&self.resolve(&myconfig)?)?;
            cmd.arg("-C").arg(parent).arg(name);
        }
        cmd.stdin(std::process::Stdio::null());

        tracing::debug!(archive = %out.display(), datasets = paths.len(), "generating tub archive");
        let output = cmd.output().await?;
        if !output.status.success() {
            let _ = tokio::fs::remove_file(&out).await;
            return Err(ArchiveError::ToolFailed {
                status: output.status.to_string(),
                stderr: truncate_utf8(String::from_utf8_lossy(&output.stderr).trim(), 4 * 1024),
            });
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::scratch_dir;

    async fn list_entries(archive: &Path) -> Vec<String> {
        let out = Command::new("tar")
            .arg("-tzf")
            .arg(archive)
            .output()
            .await
            .unwrap();
        assert!(out.status.success());
        String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(|l| l.trim_end_matches('/').to_string())
            .collect()
    }

    #[tokio::test]
    async fn archives_datasets_under_their_names() {
        let root = scratch_dir("archive-ok");
        let data = root.join("data");
        for tub in ["tub_18_19-04-06", "tub_6_20-03-31"] {
            std::fs::create_dir_all(data.join(tub)).unwrap();
            std::fs::write(data.join(tub).join("manifest.json"), b"{}").unwrap();
        }
        let carapp = root.join("mycar");
        std::fs::create_dir_all(&carapp).unwrap();
        std::fs::write(carapp.join("myconfig.py"), b"DRIVE_LOOP_HZ = 20\n").unwrap();

        let archiver = TarArchiver::new(&carapp).with_scratch_dir(root.join("tmp"));
        let archive = archiver
            .generate_archive(&[data.join("tub_18_19-04-06"), data.join("tub_6_20-03-31")])
            .await
            .unwrap();

        assert!(archive.is_file());
        let entries = list_entries(&archive).await;
        assert!(entries.contains(&"tub_18_19-04-06/manifest.json".to_string()));
        assert!(entries.contains(&"tub_6_20-03-31/manifest.json".to_string()));
        assert!(entries.contains(&"myconfig.py".to_string()));
    }

    #[tokio::test]
    async fn relative_datasets_share_one_base() {
        let root = scratch_dir("archive-relative");
        for tub in ["tub_1", "tub_2"] {
            std::fs::create_dir_all(root.join("data").join(tub)).unwrap();
            std::fs::write(root.join("data").join(tub).join("catalog_0.catalog"), b"{}").unwrap();
        }

        let archiver = TarArchiver::new(root.join("mycar"))
            .with_scratch_dir(root.join("tmp"))
            .with_base_dir(&root);
        let archive = archiver
            .generate_archive(&[PathBuf::from("data/tub_1"), PathBuf::from("data/tub_2")])
            .await
            .unwrap();

        let entries = list_entries(&archive).await;
        assert!(entries.contains(&"tub_1/catalog_0.catalog".to_string()));
        assert!(entries.contains(&"tub_2/catalog_0.catalog".to_string()));
        assert!(!entries.iter().any(|e| e.starts_with("data")));
    }

    #[test]
    fn resolve_keeps_absolute_and_joins_relative() {
        let archiver = TarArchiver::new("/nonexistent").with_base_dir("/srv/car");
        assert_eq!(
            archiver.resolve(Path::new("data/tub_1")).unwrap(),
            PathBuf::from("/srv/car/data/tub_1")
        );
        assert_eq!(
            archiver.resolve(Path::new("/data/tub_1")).unwrap(),
            PathBuf::from("/data/tub_1")
        );

        let cwd_based = TarArchiver::new("/nonexistent");
        assert!(cwd_based.resolve(Path::new("tub_1")).unwrap().is_absolute());
    }

    #[tokio::test]
    async fn missing_dataset_fails_without_archive() {
        let root = scratch_dir("archive-missing");
        let archiver = TarArchiver::new(root.join("mycar")).with_scratch_dir(root.join("tmp"));

        let err = archiver
            .generate_archive(&[root.join("nope")])
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::MissingPath(p) if p.ends_with("nope")));
        assert!(!root.join("tmp").exists());
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let archiver = TarArchiver::new("/nonexistent");
        assert!(matches!(
            archiver.generate_archive(&[]).await.unwrap_err(),
            ArchiveError::EmptyInput
        ));
    }
}
