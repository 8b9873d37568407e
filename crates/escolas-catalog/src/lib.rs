//! Record cache and artifact bookkeeping for the school catalog service.
//!
//! Downstream of the scrape engine: parses captured CSV exports into
//! [`SchoolRecord`]s, serves lookups/search/pagination from an in-memory
//! cache, and rotates the `current.csv`/`backup.csv` pair in the staging
//! directory.

pub mod record;
pub mod rotation;
pub mod store;

pub use record::{HeaderMap, SchoolRecord, parse_school_row};
pub use rotation::{BACKUP_FILE, CURRENT_FILE, FileInfo, FileRotation, RotationStats};
pub use store::{CatalogPage, CatalogStats, CatalogStore, Pagination, QueryLimits, SearchFilters};
