//! The refresh pipeline and its single-slot run guard.
//!
//! At most one refresh may be active in the whole process. A request that
//! arrives while one is running is skipped — never queued, never
//! preempting. Rotation happens strictly after a successful capture, so a
//! failed run leaves the dataset being served untouched; retries happen at
//! the next scheduled invocation, not in-process.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escolas_catalog::{CatalogStore, FileRotation};
use escolas_engine::{ExportArtifact, RunError, ScrapeEngine};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

/// The capture step, abstracted so the pipeline can be tested without a
/// browser.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    async fn fetch(&self) -> Result<ExportArtifact, RunError>;
}

#[async_trait]
impl CatalogFetcher for ScrapeEngine {
    async fn fetch(&self) -> Result<ExportArtifact, RunError> {
        self.run_once().await
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RefreshOutcome {
    Completed {
        total_schools: usize,
        dataset: PathBuf,
    },
    /// A run was already active; this request was dropped, not queued.
    Skipped,
}

pub struct RefreshService {
    fetcher: Arc<dyn CatalogFetcher>,
    rotation: Arc<FileRotation>,
    catalog: Arc<CatalogStore>,
    running: AtomicBool,
    last_run: Mutex<Option<DateTime<Utc>>>,
}

impl RefreshService {
    pub fn new(
        fetcher: Arc<dyn CatalogFetcher>,
        rotation: Arc<FileRotation>,
        catalog: Arc<CatalogStore>,
    ) -> Self {
        Self {
            fetcher,
            rotation,
            catalog,
            running: AtomicBool::new(false),
            last_run: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        *self.last_run.lock()
    }

    /// Run the full pipeline: capture → backup → promote → reload →
    /// cleanup.
    pub async fn run(&self) -> Result<RefreshOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("refresh already in progress, skipping request");
            return Ok(RefreshOutcome::Skipped);
        }
        let result = self.run_exclusive().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_exclusive(&self) -> Result<RefreshOutcome> {
        *self.last_run.lock() = Some(Utc::now());
        info!("refresh started");

        let artifact = self.fetcher.fetch().await?;

        self.rotation.ensure_dir()?;
        self.rotation.backup_current()?;
        let dataset = self.rotation.promote(&artifact.path)?;
        let total_schools = self.catalog.load_from_file(&dataset)?;
        if let Err(error) = self.rotation.cleanup_stale() {
            warn!(%error, "stale artifact cleanup failed");
        }

        info!(total_schools, "refresh complete");
        Ok(RefreshOutcome::Completed {
            total_schools,
            dataset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escolas_engine::{EngineError, RunStage};
    use std::time::Duration;

    struct FileFetcher {
        staging: PathBuf,
        content: &'static str,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl CatalogFetcher for FileFetcher {
        async fn fetch(&self) -> Result<ExportArtifact, RunError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(RunError::at(
                    RunStage::ExportTriggered,
                    EngineError::ExportTriggerNotFound,
                ));
            }
            let path = self.staging.join("catalogo_escolas_test.csv");
            std::fs::write(&path, self.content).expect("write artifact");
            Ok(ExportArtifact {
                bytes: self.content.len() as u64,
                path,
                captured_at: Utc::now(),
            })
        }
    }

    fn service(
        staging: &std::path::Path,
        delay: Duration,
        fail: bool,
    ) -> (Arc<RefreshService>, Arc<CatalogStore>, Arc<FileRotation>) {
        let rotation = Arc::new(FileRotation::new(staging));
        let catalog = Arc::new(CatalogStore::default());
        let fetcher = Arc::new(FileFetcher {
            staging: staging.to_path_buf(),
            content: "Código INEP,Escola\n1,Escola A\n2,Escola B\n",
            delay,
            fail,
        });
        let service = Arc::new(RefreshService::new(fetcher, rotation.clone(), catalog.clone()));
        (service, catalog, rotation)
    }

    #[tokio::test]
    async fn successful_refresh_rotates_and_reloads() {
        let staging = tempfile::tempdir().unwrap();
        std::fs::write(staging.path().join("current.csv"), "Código INEP\n9\n").unwrap();
        let (service, catalog, rotation) = service(staging.path(), Duration::ZERO, false);

        let outcome = service.run().await.unwrap();
        match outcome {
            RefreshOutcome::Completed { total_schools, .. } => assert_eq!(total_schools, 2),
            RefreshOutcome::Skipped => panic!("run should not be skipped"),
        }
        assert_eq!(catalog.len(), 2);
        // The previous dataset was preserved as backup.
        assert_eq!(
            std::fs::read(rotation.backup_path()).unwrap(),
            b"C\xc3\xb3digo INEP\n9\n"
        );
        assert!(service.last_run().is_some());
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn failed_capture_leaves_the_current_dataset_untouched() {
        let staging = tempfile::tempdir().unwrap();
        std::fs::write(staging.path().join("current.csv"), "Código INEP\n9\n").unwrap();
        let (service, catalog, rotation) = service(staging.path(), Duration::ZERO, true);

        assert!(service.run().await.is_err());
        assert_eq!(
            std::fs::read(rotation.current_path()).unwrap(),
            b"C\xc3\xb3digo INEP\n9\n"
        );
        assert!(!rotation.backup_path().exists());
        assert!(catalog.is_empty());
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn overlapping_request_is_skipped_not_queued() {
        let staging = tempfile::tempdir().unwrap();
        let (service, _, _) = service(staging.path(), Duration::from_millis(50), false);

        let first = service.clone();
        let second = service.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { first.run().await.unwrap() }),
            async move {
                // Let the first run claim the slot.
                tokio::time::sleep(Duration::from_millis(10)).await;
                second.run().await.unwrap()
            }
        );
        let a = a.unwrap();

        assert!(matches!(a, RefreshOutcome::Completed { .. }));
        assert!(matches!(b, RefreshOutcome::Skipped));
    }
}
