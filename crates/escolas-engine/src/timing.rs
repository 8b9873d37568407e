//! Heuristic wait durations.
//!
//! The portal emits no structured "done" signal after a selection or after
//! filters are applied, so every wait below is a heuristic, not a contract.
//! The two named profiles mirror the portal's observed behavior: `fast` for
//! routine headless runs, `patient` when the portal is slow or a run is
//! being watched interactively.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TimingProfile {
    pub name: &'static str,
    /// Extra wait after the page load event before scanning for fields.
    pub page_ready: Duration,
    /// Wait for a value list to render after opening it.
    pub menu_reveal: Duration,
    /// Wait after toggling an entry before closing the list.
    pub post_toggle: Duration,
    /// Wait for the list to disappear after closing it.
    pub menu_close: Duration,
    /// Pause between consecutive field configurations.
    pub between_fields: Duration,
    /// Wait for dependent fields to re-render after a prerequisite is set.
    pub dependent_refresh: Duration,
    /// Settle wait after the apply trigger; the portal recomputes with no
    /// completion signal.
    pub submit_settle: Duration,
    /// Bound on waiting for a field element to attach.
    pub element_wait: Duration,
    /// Bound on waiting for in-list controls and overlays.
    pub control_wait: Duration,
    /// Bound on the initial field scan after navigation.
    pub fields_visible_timeout: Duration,
    pub navigation_timeout: Duration,
    pub delivery_timeout: Duration,
}

impl TimingProfile {
    pub fn fast() -> Self {
        Self {
            name: "fast",
            page_ready: Duration::from_millis(1000),
            menu_reveal: Duration::from_millis(500),
            post_toggle: Duration::from_millis(200),
            menu_close: Duration::from_millis(300),
            between_fields: Duration::ZERO,
            dependent_refresh: Duration::from_millis(2000),
            submit_settle: Duration::from_millis(5000),
            element_wait: Duration::from_millis(3000),
            control_wait: Duration::from_millis(1000),
            fields_visible_timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(60),
            delivery_timeout: Duration::from_secs(60),
        }
    }

    pub fn patient() -> Self {
        Self {
            name: "patient",
            page_ready: Duration::from_millis(3000),
            menu_reveal: Duration::from_millis(1500),
            post_toggle: Duration::from_millis(500),
            menu_close: Duration::from_millis(1000),
            between_fields: Duration::from_millis(300),
            dependent_refresh: Duration::from_millis(4000),
            submit_settle: Duration::from_millis(10000),
            element_wait: Duration::from_millis(5000),
            control_wait: Duration::from_millis(2000),
            fields_visible_timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(60),
            delivery_timeout: Duration::from_secs(60),
        }
    }

    /// Zero-wait profile for tests against the scripted mock.
    pub fn instant() -> Self {
        Self {
            name: "instant",
            page_ready: Duration::ZERO,
            menu_reveal: Duration::ZERO,
            post_toggle: Duration::ZERO,
            menu_close: Duration::ZERO,
            between_fields: Duration::ZERO,
            dependent_refresh: Duration::ZERO,
            submit_settle: Duration::ZERO,
            element_wait: Duration::ZERO,
            control_wait: Duration::ZERO,
            fields_visible_timeout: Duration::ZERO,
            navigation_timeout: Duration::ZERO,
            delivery_timeout: Duration::ZERO,
        }
    }
}
