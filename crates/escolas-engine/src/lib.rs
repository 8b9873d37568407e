//! Filter-configuration and export-capture engine.
//!
//! The INEP school catalog portal exposes no programmatic API: the dataset
//! is only reachable by driving its dashboard through a sequence of filter
//! selections and triggering a server-side CSV export. This crate is that
//! driver — a small state machine over a non-cooperative, partially
//! observable remote UI:
//!
//! - [`discovery`] scans the rendered page for dropdown-capable fields and
//!   infers labels through ordered DOM-shape heuristics;
//! - [`deps`] skips fields whose prerequisites already cover them;
//! - [`selection`] marks "all values" on one field through a strategy
//!   chain tolerant of the portal's markup variants;
//! - [`submit`] applies the filter set and waits out the recomputation;
//! - [`export`] arms the download listener, triggers the export and
//!   persists the artifact under a deterministic name.
//!
//! Per-field problems are absorbed; run-level failures carry the stage and
//! field for diagnosing markup drift.

pub mod config;
pub mod deps;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod export;
pub mod selection;
pub mod submit;
pub mod timing;
pub mod types;

pub use config::{DEFAULT_PORTAL_URL, EngineConfig, TimingMode};
pub use engine::ScrapeEngine;
pub use error::{EngineError, RunError};
pub use export::artifact_file_name;
pub use timing::TimingProfile;
pub use types::{
    ConfiguredField, ExportArtifact, FilterField, RunStage, SelectionOutcome, SkipReason,
};
