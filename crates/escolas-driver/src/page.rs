//! Capability surface the scrape engine drives a session through.
//!
//! The portal markup is inconsistent between deployments, so the operations
//! here stay close to what the engine actually needs: selector queries,
//! clicks, displayed-value reads, bounded waits and the download capture
//! primitive. The production implementation is [`ChromiumSession`]; tests use
//! the scripted mock behind the `test-utils` feature.
//!
//! [`ChromiumSession`]: crate::ChromiumSession

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DriverResult;

/// Target state for [`Page::wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Attached,
    Visible,
    Hidden,
}

/// One entry of a revealed value-selection list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueOption {
    pub index: usize,
    pub id: String,
    pub value: String,
    pub text: String,
    pub checked: bool,
}

/// A file delivered by the remote export, still under its transport name.
#[derive(Debug, Clone)]
pub struct DownloadEvent {
    pub path: PathBuf,
    pub bytes: u64,
}

/// One interactive session against the rendered portal.
///
/// Every remote interaction is a bounded wait; implementations must not
/// block indefinitely. All operations take `&self` because a session is
/// driven strictly sequentially.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for the load to finish.
    async fn goto(&self, url: &str, timeout: Duration) -> DriverResult<()>;

    /// Poll until the first element matching `selector` reaches `state`.
    /// Returns `false` on timeout rather than erroring; callers decide
    /// whether the missed condition is fatal.
    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> DriverResult<bool>;

    /// Read one attribute from every element matching `selector`.
    /// Elements without the attribute are skipped.
    async fn query_attribute_all(
        &self,
        selector: &str,
        attribute: &str,
    ) -> DriverResult<Vec<String>>;

    async fn exists(&self, selector: &str) -> DriverResult<bool>;

    async fn is_visible(&self, selector: &str) -> DriverResult<bool>;

    async fn is_enabled(&self, selector: &str) -> DriverResult<bool>;

    /// Displayed value of an input control, `None` when the element is gone.
    async fn input_value(&self, selector: &str) -> DriverResult<Option<String>>;

    /// Clear a free-text input.
    async fn clear_input(&self, selector: &str) -> DriverResult<()>;

    /// Click the first visible match. Returns `false` when nothing matched,
    /// so fallback chains can move on without treating it as a failure.
    async fn click(&self, selector: &str) -> DriverResult<bool>;

    /// Click at page coordinates (used to dismiss overlays by clicking
    /// outside them).
    async fn click_at(&self, x: f64, y: f64) -> DriverResult<()>;

    /// Scan elements of the given tags for one whose trimmed visible text
    /// matches `text` (exactly, or by containment) and click it.
    async fn click_text(&self, tags: &[&str], text: &str, exact: bool) -> DriverResult<bool>;

    /// Full text of the document body.
    async fn body_text(&self) -> DriverResult<String>;

    /// Enumerate the checkable entries of a revealed value list.
    async fn list_options(&self, list_selector: &str) -> DriverResult<Vec<ValueOption>>;

    /// Toggle one entry of a revealed value list by index. Returns the new
    /// checked state.
    async fn toggle_option(&self, list_selector: &str, index: usize) -> DriverResult<bool>;

    /// Evaluate a JavaScript expression and return its JSON value. Escape
    /// hatch for the DOM-shape heuristics that have no selector equivalent.
    async fn eval(&self, expression: &str) -> DriverResult<Value>;

    /// Start buffering download events. Must be called before the action
    /// that triggers the export, otherwise the delivery can race the
    /// listener and be lost.
    async fn arm_download(&self) -> DriverResult<()>;

    /// Wait for the next armed download to complete.
    async fn wait_for_download(&self, timeout: Duration) -> DriverResult<DownloadEvent>;

    /// Full-page capture for debugging.
    async fn screenshot(&self, path: &Path) -> DriverResult<()>;
}
