//! Run-scoped entities. Nothing here survives across runs.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sentinel shown for fields whose label could not be inferred. Such fields
/// are still configured; they are only excluded from required-field
/// accounting.
pub const UNLABELED: &str = "Campo sem label";

/// One discovered dropdown-capable field.
#[derive(Debug, Clone)]
pub struct FilterField {
    pub input_id: String,
    pub icon_id: String,
    pub label: Option<String>,
}

impl FilterField {
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(UNLABELED)
    }

    pub fn input_selector(&self) -> String {
        format!("#{}", self.input_id)
    }

    pub fn icon_selector(&self) -> String {
        format!("#{}", self.icon_id)
    }
}

/// Record of one attempted configuration, appended in discovery order.
#[derive(Debug, Clone, Serialize)]
pub struct ConfiguredField {
    pub label: String,
    pub has_all_values: bool,
}

/// Why a field was left unconfigured without failing the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NotFound,
    Hidden,
    Disabled,
}

/// Result of one selection attempt, consumed immediately by the run loop.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionOutcome {
    pub success: bool,
    pub has_all_values: bool,
    pub skip: Option<SkipReason>,
}

impl SelectionOutcome {
    pub fn achieved(has_all_values: bool) -> Self {
        Self {
            success: true,
            has_all_values,
            skip: None,
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            success: false,
            has_all_values: false,
            skip: Some(reason),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            has_all_values: false,
            skip: None,
        }
    }
}

/// The captured export file. Ownership passes to the caller (rotation).
#[derive(Debug, Clone, Serialize)]
pub struct ExportArtifact {
    pub path: PathBuf,
    pub bytes: u64,
    pub captured_at: DateTime<Utc>,
}

/// Stages of one scrape run; fatal errors carry the stage they surfaced at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStage {
    Idle,
    Navigated,
    FieldsDiscovered,
    ConfiguringFields,
    FiltersApplied,
    ExportTriggered,
    Captured,
    Done,
}
