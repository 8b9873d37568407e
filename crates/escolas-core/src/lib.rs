//! Service composition for the school catalog API.
//!
//! [`AppCore`] wires the scrape engine, the record cache and the rotation
//! pair together, owns the refresh pipeline with its process-wide run
//! guard, and keeps the daily scheduler alive.

pub mod config;
pub mod refresh;
pub mod scheduler;

use std::sync::Arc;

use anyhow::Result;
use escolas_catalog::{CatalogStore, FileRotation};
use escolas_engine::ScrapeEngine;
use parking_lot::Mutex;
use tracing::{info, warn};

pub use config::{API_VERSION, AppConfig};
pub use refresh::{CatalogFetcher, RefreshOutcome, RefreshService};
pub use scheduler::{DailyScheduler, SchedulerStatus};

pub struct AppCore {
    pub config: AppConfig,
    pub catalog: Arc<CatalogStore>,
    pub rotation: Arc<FileRotation>,
    pub refresh: Arc<RefreshService>,
    scheduler: Mutex<DailyScheduler>,
}

impl AppCore {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let rotation = Arc::new(FileRotation::new(&config.data_dir));
        rotation.ensure_dir()?;
        rotation.migrate_legacy()?;

        let catalog = Arc::new(CatalogStore::new(config.query_limits()));
        match rotation.latest() {
            Some(dataset) => {
                // A corrupt file on disk should not keep the service from
                // booting; a manual refresh replaces it.
                if let Err(error) = catalog.load_from_file(&dataset) {
                    warn!(%error, "could not load dataset from disk");
                }
            }
            None => info!("no dataset on disk yet; trigger a refresh to download one"),
        }

        let engine = ScrapeEngine::new(config.engine_config());
        let refresh = Arc::new(RefreshService::new(
            Arc::new(engine),
            rotation.clone(),
            catalog.clone(),
        ));

        let mut scheduler = DailyScheduler::new(refresh.clone(), config.daily_download);
        scheduler.start().await?;

        Ok(Self {
            config,
            catalog,
            rotation,
            refresh,
            scheduler: Mutex::new(scheduler),
        })
    }

    pub fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.lock().status()
    }

    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = {
            let mut guard = self.scheduler.lock();
            std::mem::replace(&mut *guard, DailyScheduler::new(self.refresh.clone(), false))
        };
        scheduler.shutdown().await
    }
}
