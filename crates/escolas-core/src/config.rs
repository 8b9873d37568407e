//! Environment-driven application configuration.

use std::path::PathBuf;

use escolas_catalog::QueryLimits;
use escolas_engine::{DEFAULT_PORTAL_URL, EngineConfig, TimingMode};
use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATA_DIR: &str = "./data/downloads";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    /// Staging directory: captured artifacts plus the current/backup pair.
    pub data_dir: PathBuf,
    pub portal_url: String,
    pub headless: bool,
    /// Whether the daily midnight refresh is scheduled.
    pub daily_download: bool,
    pub timing: TimingMode,
    pub debug_captures: bool,
    pub max_results_per_page: usize,
    pub default_page_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let limits = QueryLimits::default();
        Self {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            headless: true,
            daily_download: true,
            timing: TimingMode::Fast,
            debug_captures: false,
            max_results_per_page: limits.max_results,
            default_page_size: limits.default_page_size,
        }
    }
}

impl AppConfig {
    /// Read overrides from the environment, keeping the original service's
    /// variable names (`PORT`, `HEADLESS`, `DAILY_DOWNLOAD`).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = env_var("PORT").and_then(|v| v.parse().ok()) {
            config.port = port;
        }
        if let Some(dir) = env_var("ESCOLAS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = env_var("ESCOLAS_PORTAL_URL") {
            config.portal_url = url;
        }
        if env_var("HEADLESS").as_deref() == Some("false") {
            config.headless = false;
        }
        if env_var("DAILY_DOWNLOAD").as_deref() == Some("false") {
            config.daily_download = false;
        }
        if env_var("ESCOLAS_TIMING").as_deref() == Some("patient") {
            config.timing = TimingMode::Patient;
        }
        if env_var("ESCOLAS_DEBUG").as_deref() == Some("true") {
            config.debug_captures = true;
        }
        config
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            portal_url: self.portal_url.clone(),
            staging_dir: self.data_dir.clone(),
            headless: self.headless,
            timing: self.timing,
            debug_captures: self.debug_captures,
            ..EngineConfig::default()
        }
    }

    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            max_results: self.max_results_per_page,
            default_page_size: self.default_page_size,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
