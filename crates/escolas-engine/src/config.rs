//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use escolas_driver::LaunchOptions;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::timing::TimingProfile;

/// The dashboard entry point for the school catalog pre-listing.
pub const DEFAULT_PORTAL_URL: &str = "https://anonymousdata.inep.gov.br/analytics/saw.dll?Dashboard&PortalPath=%2Fshared%2FCenso%20da%20Educa%C3%A7%C3%A3o%20B%C3%A1sica%2F_portal%2FCat%C3%A1logo%20de%20Escolas&Page=Pr%C3%A9-Lista%20das%20Escolas";

const DEFAULT_STAGING_DIR: &str = "./data/downloads";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;
const MIN_COMMAND_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    #[default]
    Fast,
    Patient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub portal_url: String,
    /// Where captured artifacts land; created if absent.
    pub staging_dir: PathBuf,
    pub headless: bool,
    /// Leave the browser running after the run for manual inspection.
    /// Only honored in interactive (non-headless) mode.
    pub keep_open: bool,
    /// Write full-page screenshots into the staging directory at each run
    /// stage.
    pub debug_captures: bool,
    pub timing: TimingMode,
    /// Ceiling for any single remote command.
    pub command_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            headless: true,
            keep_open: false,
            debug_captures: false,
            timing: TimingMode::Fast,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.portal_url.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "portal URL must not be empty".to_string(),
            ));
        }
        if self.staging_dir.as_os_str().is_empty() {
            return Err(EngineError::InvalidConfig(
                "staging directory must not be empty".to_string(),
            ));
        }
        if self.keep_open && self.headless {
            return Err(EngineError::InvalidConfig(
                "keep_open requires an interactive (non-headless) session".to_string(),
            ));
        }
        if self.command_timeout_secs < MIN_COMMAND_TIMEOUT_SECS {
            return Err(EngineError::InvalidConfig(format!(
                "command timeout must be at least {MIN_COMMAND_TIMEOUT_SECS} seconds"
            )));
        }
        Ok(())
    }

    pub fn timing_profile(&self) -> TimingProfile {
        match self.timing {
            TimingMode::Fast => TimingProfile::fast(),
            TimingMode::Patient => TimingProfile::patient(),
        }
    }

    pub fn launch_options(&self) -> LaunchOptions {
        let mut options = LaunchOptions::new(&self.staging_dir);
        options.headless = self.headless;
        options.command_timeout = Duration::from_secs(self.command_timeout_secs);
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn keep_open_requires_interactive_mode() {
        let config = EngineConfig {
            keep_open: true,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            keep_open: true,
            headless: false,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn short_command_timeout_is_rejected() {
        let config = EngineConfig {
            command_timeout_secs: 1,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
