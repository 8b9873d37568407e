//! Export capture.
//!
//! The download listener is armed before any trigger is touched: the portal
//! can start delivering the file immediately on click, and a listener
//! attached afterwards would lose the event.

use std::path::Path;

use chrono::{DateTime, Utc};
use escolas_driver::{DriverError, Page};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::timing::TimingProfile;
use crate::types::ExportArtifact;

/// Known shapes of the export trigger, specific to generic. The portal
/// builds it as an anchor whose `onclick` drives the download dialog.
const EXPORT_SELECTORS: &[&str] = &[
    "a[onclick*='Download('][onclick*='csv']",
    "a[onclick*='Download(']",
    "a[onclick*='Format=csv']",
    "a[onclick*='Extension=.csv']",
    "a[title*='Export']",
    "a[onclick*='NQWClearActiveMenu']",
];

/// Deterministic artifact name: ISO-8601 at seconds precision with colons
/// and dots replaced so the name is filesystem-safe everywhere.
pub fn artifact_file_name(captured_at: DateTime<Utc>) -> String {
    format!(
        "catalogo_escolas_{}.csv",
        captured_at.format("%Y-%m-%dT%H-%M-%S")
    )
}

/// Trigger the export and persist the delivered bytes under the
/// deterministic name inside `staging_dir` (created if absent).
pub async fn capture_export(
    page: &dyn Page,
    staging_dir: &Path,
    timing: &TimingProfile,
) -> Result<ExportArtifact, EngineError> {
    std::fs::create_dir_all(staging_dir)?;

    // Armed before the trigger chain runs; see module docs.
    page.arm_download().await?;

    let mut triggered = false;
    for selector in EXPORT_SELECTORS {
        if page.click(selector).await? {
            debug!(selector, "export trigger activated");
            triggered = true;
            break;
        }
    }
    if !triggered {
        triggered = page.click_text(&["a", "button"], "Exportar", true).await?
            || page.click_text(&["a"], "Export", false).await?
            || page.click_text(&["a"], "Download", false).await?;
        if triggered {
            debug!("export trigger activated via text scan");
        }
    }
    if !triggered {
        return Err(EngineError::ExportTriggerNotFound);
    }

    info!("export triggered, waiting for delivery");
    let delivery = match page.wait_for_download(timing.delivery_timeout).await {
        Ok(event) => event,
        Err(DriverError::DownloadTimeout(_)) => return Err(EngineError::DeliveryTimeout),
        Err(other) => return Err(EngineError::Driver(other)),
    };

    let captured_at = Utc::now();
    let destination = staging_dir.join(artifact_file_name(captured_at));
    if std::fs::rename(&delivery.path, &destination).is_err() {
        // Delivery landed on another filesystem; fall back to copying.
        std::fs::copy(&delivery.path, &destination)?;
        let _ = std::fs::remove_file(&delivery.path);
    }
    let bytes = std::fs::metadata(&destination)
        .map(|meta| meta.len())
        .unwrap_or(delivery.bytes);

    info!(artifact = %destination.display(), bytes, "export captured");
    Ok(ExportArtifact {
        path: destination,
        bytes,
        captured_at,
    })
}
