//! The fixed set of tables the snapshot cache may hold.

/// Tables every request snapshots.
pub const CACHED_TABLES: &[&str] = &[
    "members",
    "installed_localizations",
    "installed_themes",
    "installed_webfonts",
    "settings",
    "sessions",
    "member_devices",
    "likes",
    "subscriptions",
    "forums",
    "topics",
    "posts",
];

/// Immutable list of cacheable tables. Names outside it are never fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRegistry {
    tables: &'static [&'static str],
}

impl CacheRegistry {
    pub const fn new(tables: &'static [&'static str]) -> Self {
        Self { tables }
    }

    pub const fn standard() -> Self {
        Self::new(CACHED_TABLES)
    }

    pub fn tables(&self) -> &'static [&'static str] {
        self.tables
    }

    /// The registered spelling of `table`, if it is cacheable.
    pub fn resolve(&self, table: &str) -> Option<&'static str> {
        self.tables.iter().copied().find(|name| *name == table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.resolve(table).is_some()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
