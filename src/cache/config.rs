//! Cache configuration.
//!
//! `cache.enabled` and `cache.method` are accepted for deployment compatibility.
//! Every combination resolves to the per-request snapshot provider, since it is
//! the only read path the application has.

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMethod {
    #[default]
    Snapshot,
}

impl CacheMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheMethod::Snapshot => "snapshot",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub method: CacheMethod,
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        if !settings.enabled {
            warn!(
                target = "bulletin_fusion::cache",
                "cache.enabled is false; table snapshots are still taken per request"
            );
        }

        match settings.method.as_str() {
            "snapshot" | "none" | "nocache" => {}
            other => warn!(
                target = "bulletin_fusion::cache",
                method = other,
                fallback = CacheMethod::Snapshot.as_str(),
                "Unknown cache method"
            ),
        }

        Self {
            method: CacheMethod::Snapshot,
        }
    }
}
