//! Engine error taxonomy.
//!
//! Per-field problems (`not-found`/`hidden`/`disabled`, exhausted strategy
//! chains) are not errors at all — they are [`SelectionOutcome`] values and
//! the run continues. Everything here is run-fatal.
//!
//! [`SelectionOutcome`]: crate::types::SelectionOutcome

use escolas_driver::DriverError;

use crate::types::RunStage;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("portal navigation did not complete in time")]
    NavigationTimeout,

    #[error("no dropdown-capable fields discovered on the rendered page")]
    NoFieldsDiscovered,

    #[error("apply trigger not found after exhausting all strategies")]
    SubmissionTriggerNotFound,

    #[error("export trigger not found after exhausting all strategies")]
    ExportTriggerNotFound,

    #[error("export delivery did not arrive in time")]
    DeliveryTimeout,

    #[error("session driver failure: {0}")]
    Driver(#[from] DriverError),

    #[error("staging directory failure: {0}")]
    Io(#[from] std::io::Error),
}

/// A fatal run failure, annotated with the stage (and field, when one was
/// being worked on) so markup drift on the portal can be diagnosed.
#[derive(Debug)]
pub struct RunError {
    pub stage: RunStage,
    pub field: Option<String>,
    pub source: EngineError,
}

impl RunError {
    pub fn at(stage: RunStage, source: EngineError) -> Self {
        Self {
            stage,
            field: None,
            source,
        }
    }

    pub fn at_field(stage: RunStage, field: impl Into<String>, source: EngineError) -> Self {
        Self {
            stage,
            field: Some(field.into()),
            source,
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(
                f,
                "run failed at stage {:?} (field {}): {}",
                self.stage, field, self.source
            ),
            None => write!(f, "run failed at stage {:?}: {}", self.stage, self.source),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_error_display_names_stage_and_field() {
        let error = RunError::at(RunStage::FiltersApplied, EngineError::SubmissionTriggerNotFound);
        assert!(error.to_string().contains("FiltersApplied"));

        let error = RunError::at_field(
            RunStage::ConfiguringFields,
            "Região",
            EngineError::NavigationTimeout,
        );
        assert!(error.to_string().contains("Região"));
    }
}
