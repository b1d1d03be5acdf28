//! Table snapshot cache.
//!
//! Every request reads the small, hot forum tables (members, sessions, settings,
//! installed themes and so on) from an in-memory snapshot taken at the start of
//! the request. Writes go through the query builder and then re-fetch the touched
//! table explicitly. Snapshots are never shared between requests.
//!
//! ```toml
//! [cache]
//! enabled = true
//! method = "snapshot"
//! ```

mod config;
mod registry;
mod snapshot;

pub use config::{CacheConfig, CacheMethod};
pub use registry::{CACHED_TABLES, CacheRegistry};
pub use snapshot::{SnapshotCache, TableSet};

pub const METRIC_CACHE_REFRESH_TOTAL: &str = "bulletin_cache_refresh_total";
