//! Session driver for the school catalog scraper.
//!
//! Owns one interactive Chromium session per scrape run: process spawn,
//! DevTools attachment, bounded remote interaction, asynchronous download
//! capture and guaranteed release. The scrape engine only ever sees the
//! [`Page`] trait, which keeps it testable against the scripted mock in
//! [`mock`] (feature `test-utils`).

mod cdp;
mod chromium;
mod error;
mod page;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use chromium::{ChromiumSession, LaunchOptions};
pub use error::{DriverError, DriverResult};
pub use page::{DownloadEvent, Page, ValueOption, WaitState};
