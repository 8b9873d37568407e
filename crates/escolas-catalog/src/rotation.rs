//! Current/backup artifact rotation in the staging directory.
//!
//! The active dataset always lives at `current.csv`; the previous one at
//! `backup.csv`. Rotation runs only after a successful capture, so a failed
//! run never disturbs the file the service is currently serving from.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

pub const CURRENT_FILE: &str = "current.csv";
pub const BACKUP_FILE: &str = "backup.csv";

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub exists: bool,
    #[serde(rename = "sizeBytes", skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl FileInfo {
    fn of(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) => Self {
                exists: true,
                size_bytes: Some(meta.len()),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            },
            Err(_) => Self {
                exists: false,
                size_bytes: None,
                modified: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RotationStats {
    pub current: FileInfo,
    pub backup: FileInfo,
}

pub struct FileRotation {
    dir: PathBuf,
}

impl FileRotation {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating staging directory {}", self.dir.display()))
    }

    pub fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP_FILE)
    }

    /// The newest usable dataset: `current.csv`, falling back to
    /// `backup.csv`.
    pub fn latest(&self) -> Option<PathBuf> {
        let current = self.current_path();
        if current.exists() {
            return Some(current);
        }
        let backup = self.backup_path();
        if backup.exists() {
            warn!("current dataset missing, serving from backup");
            return Some(backup);
        }
        None
    }

    /// Move `current.csv` to `backup.csv`, replacing any older backup.
    /// Returns whether there was a current file to back up.
    pub fn backup_current(&self) -> Result<bool> {
        let current = self.current_path();
        if !current.exists() {
            debug!("no current dataset to back up");
            return Ok(false);
        }
        let backup = self.backup_path();
        if backup.exists() {
            std::fs::remove_file(&backup)
                .with_context(|| format!("removing stale backup {}", backup.display()))?;
        }
        std::fs::rename(&current, &backup).with_context(|| {
            format!("moving {} to {}", current.display(), backup.display())
        })?;
        info!("current dataset moved to backup");
        Ok(true)
    }

    /// Install a captured artifact as `current.csv`.
    pub fn promote(&self, source: &Path) -> Result<PathBuf> {
        let current = self.current_path();
        if current.exists() {
            std::fs::remove_file(&current)
                .with_context(|| format!("removing previous {}", current.display()))?;
        }
        std::fs::rename(source, &current).with_context(|| {
            format!("moving {} to {}", source.display(), current.display())
        })?;
        info!(file = %current.display(), "artifact promoted to current dataset");
        Ok(current)
    }

    /// Delete leftover timestamped artifacts from older runs.
    pub fn cleanup_stale(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("listing staging directory {}", self.dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(".csv") || name == CURRENT_FILE || name == BACKUP_FILE {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!(file = %name, "stale artifact removed");
                    removed += 1;
                }
                Err(error) => warn!(file = %name, %error, "failed to remove stale artifact"),
            }
        }
        Ok(removed)
    }

    /// One-time adoption of pre-rotation layouts: the newest timestamped
    /// artifact becomes current, the next newest becomes backup, the rest
    /// are deleted.
    pub fn migrate_legacy(&self) -> Result<()> {
        let mut legacy: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("listing staging directory {}", self.dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy().to_string();
            if !name.ends_with(".csv") || name == CURRENT_FILE || name == BACKUP_FILE {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            legacy.push((entry.path(), modified));
        }
        if legacy.is_empty() {
            return Ok(());
        }
        legacy.sort_by(|a, b| b.1.cmp(&a.1));

        let mut legacy = legacy.into_iter().map(|(path, _)| path);
        if !self.current_path().exists()
            && let Some(newest) = legacy.next()
        {
            info!(file = %newest.display(), "adopting newest legacy artifact as current");
            std::fs::rename(&newest, self.current_path())?;
        }
        if !self.backup_path().exists()
            && let Some(next) = legacy.next()
        {
            info!(file = %next.display(), "adopting legacy artifact as backup");
            std::fs::rename(&next, self.backup_path())?;
        }
        for stale in legacy {
            if let Err(error) = std::fs::remove_file(&stale) {
                warn!(file = %stale.display(), %error, "failed to remove legacy artifact");
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> RotationStats {
        RotationStats {
            current: FileInfo::of(&self.current_path()),
            backup: FileInfo::of(&self.backup_path()),
        }
    }
}
