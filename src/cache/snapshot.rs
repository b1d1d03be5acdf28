//! Per-request table snapshots.
//!
//! Each registered table is fetched with `SELECT *` into memory and served from
//! there for the rest of the request. A snapshot is only ever replaced whole;
//! callers that write a table re-fetch it with [`SnapshotCache::update`].

use std::{collections::BTreeMap, collections::HashMap, fmt, sync::Arc};

use metrics::counter;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::infra::db::{DataError, DatabaseProvider, QueryBuilder, Record};

use super::{METRIC_CACHE_REFRESH_TOTAL, registry::CacheRegistry};

pub struct SnapshotCache {
    registry: CacheRegistry,
    builder: QueryBuilder,
    tables: HashMap<&'static str, Vec<Record>>,
}

impl fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<_, _> = self
            .tables
            .iter()
            .map(|(table, rows)| (*table, rows.len()))
            .collect();
        f.debug_struct("SnapshotCache")
            .field("registry", &self.registry)
            .field("tables", &counts)
            .finish()
    }
}

impl SnapshotCache {
    pub fn new(
        db: Arc<dyn DatabaseProvider>,
        table_prefix: impl Into<String>,
        registry: CacheRegistry,
    ) -> Self {
        Self {
            registry,
            builder: QueryBuilder::new(db, table_prefix),
            tables: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    /// Fetch every registered table that has no rows yet.
    ///
    /// An empty table cannot be told apart from one that was never fetched, so
    /// empty tables are queried again on every call.
    pub async fn build(&mut self) -> Result<(), DataError> {
        for &table in self.registry.tables() {
            let populated = self.tables.get(table).is_some_and(|rows| !rows.is_empty());
            if !populated {
                self.fetch(table).await?;
            }
        }
        Ok(())
    }

    /// Re-fetch one table unconditionally.
    pub async fn update(&mut self, table: &str) -> Result<(), DataError> {
        let name = self
            .registry
            .resolve(table)
            .ok_or_else(|| DataError::unregistered(table))?;
        self.fetch(name).await
    }

    /// [`update`](Self::update) each table in order.
    pub async fn update_all(&mut self, tables: &[&str]) -> Result<(), DataError> {
        for table in tables {
            self.update(table).await?;
        }
        Ok(())
    }

    /// Current rows, or an empty slice for unknown and unfetched tables. Never queries.
    pub fn get(&self, table: &str) -> &[Record] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Decode every row of `table` into `T`.
    pub fn decode<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>, DataError> {
        self.get(table).iter().map(|row| row.decode()).collect()
    }

    /// Look up several tables at once under caller-chosen aliases.
    pub fn get_all<'a>(&'a self, aliases: &[(&str, &str)]) -> TableSet<'a> {
        let entries = aliases
            .iter()
            .map(|(alias, table)| (alias.to_string(), self.get(table)))
            .collect();
        TableSet { entries }
    }

    /// Row count per fetched table.
    pub fn row_counts(&self) -> BTreeMap<&'static str, usize> {
        self.tables
            .iter()
            .map(|(table, rows)| (*table, rows.len()))
            .collect()
    }

    async fn fetch(&mut self, table: &'static str) -> Result<(), DataError> {
        self.builder.reset().select("*").from(table, None);
        let result = self.builder.execute().await;
        self.builder.reset();

        let rows = result?.into_rows();
        debug!(
            target = "bulletin_fusion::cache::snapshot",
            table,
            rows = rows.len(),
            "Snapshot refreshed"
        );
        counter!(METRIC_CACHE_REFRESH_TOTAL, "table" => table).increment(1);

        self.tables.insert(table, rows);
        Ok(())
    }
}

/// Several snapshots keyed by alias.
#[derive(Debug, Default)]
pub struct TableSet<'a> {
    entries: BTreeMap<String, &'a [Record]>,
}

impl<'a> TableSet<'a> {
    pub fn get(&self, alias: &str) -> &'a [Record] {
        self.entries.get(alias).copied().unwrap_or(&[])
    }

    /// Decode every row under `alias` into `T`.
    pub fn decode<T: DeserializeOwned>(&self, alias: &str) -> Result<Vec<T>, DataError> {
        self.get(alias).iter().map(|row| row.decode()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::config::DatabaseDriver;
    use crate::infra::db::{ResultSet, SqlValue, Statement};

    #[derive(Default)]
    struct TableDatabase {
        rows: Mutex<HashMap<String, Vec<Record>>>,
        issued: Mutex<Vec<String>>,
    }

    impl TableDatabase {
        fn with_rows(table: &str, count: usize) -> Self {
            let db = Self::default();
            db.set_rows(table, count);
            db
        }

        fn set_rows(&self, table: &str, count: usize) {
            let rows = (0..count)
                .map(|id| {
                    let mut record = Record::default();
                    record.insert("id", json!(id));
                    record
                })
                .collect();
            self.rows.lock().unwrap().insert(table.to_string(), rows);
        }

        fn issued(&self) -> Vec<String> {
            self.issued.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DatabaseProvider for TableDatabase {
        fn driver(&self) -> DatabaseDriver {
            DatabaseDriver::Sqlite
        }

        async fn connect(&self) -> Result<(), DataError> {
            Ok(())
        }

        async fn query(&self, sql: &str, _values: &[SqlValue]) -> Result<ResultSet, DataError> {
            self.issued.lock().unwrap().push(sql.to_string());
            let table = sql.rsplit(' ').next().unwrap_or_default();
            let rows = self
                .rows
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default();
            Ok(ResultSet::from_rows(rows))
        }

        async fn transaction(&self, _: &[Statement]) -> Result<Vec<ResultSet>, DataError> {
            Ok(Vec::new())
        }

        async fn disconnect(&self) {}

        async fn is_connected(&self) -> bool {
            true
        }

        fn total_queries(&self) -> u64 {
            self.issued.lock().unwrap().len() as u64
        }
    }

    const TWO_TABLES: CacheRegistry = CacheRegistry::new(&["members", "sessions"]);

    #[tokio::test]
    async fn build_fetches_each_registered_table_once_populated() {
        let db = Arc::new(TableDatabase::with_rows("members", 3));
        db.set_rows("sessions", 1);
        let mut cache = SnapshotCache::new(db.clone(), "", TWO_TABLES);

        cache.build().await.expect("build");
        assert_eq!(cache.get("members").len(), 3);
        assert_eq!(cache.get("sessions").len(), 1);
        assert_eq!(
            db.issued(),
            vec!["SELECT * FROM members", "SELECT * FROM sessions"]
        );

        cache.build().await.expect("second build");
        assert_eq!(db.total_queries(), 2, "populated tables are skipped");
    }

    #[tokio::test]
    async fn build_refetches_empty_tables() {
        let db = Arc::new(TableDatabase::with_rows("members", 2));
        let mut cache = SnapshotCache::new(db.clone(), "", TWO_TABLES);

        cache.build().await.expect("build");
        cache.build().await.expect("build again");

        let sessions_queries = db
            .issued()
            .iter()
            .filter(|sql| sql.ends_with("sessions"))
            .count();
        assert_eq!(sessions_queries, 2);
    }

    #[tokio::test]
    async fn get_never_queries_and_unknown_tables_are_empty() {
        let db = Arc::new(TableDatabase::with_rows("members", 2));
        let cache = SnapshotCache::new(db.clone(), "", TWO_TABLES);

        assert!(cache.get("members").is_empty());
        assert!(cache.get("posts").is_empty());
        assert_eq!(db.total_queries(), 0);
    }

    #[tokio::test]
    async fn update_always_requeries() {
        let db = Arc::new(TableDatabase::with_rows("members", 1));
        let mut cache = SnapshotCache::new(db.clone(), "bf_", TWO_TABLES);

        cache.update("members").await.expect("update");
        db.set_rows("bf_members", 4);
        cache.update("members").await.expect("update");

        assert_eq!(db.total_queries(), 2);
        assert_eq!(cache.get("members").len(), 4);
    }

    #[tokio::test]
    async fn update_rejects_unregistered_tables_without_querying() {
        let db = Arc::new(TableDatabase::default());
        let mut cache = SnapshotCache::new(db.clone(), "", TWO_TABLES);

        let err = cache.update("posts").await.expect_err("not cacheable");
        assert!(matches!(err, DataError::Unregistered { ref table } if table == "posts"));
        assert_eq!(db.total_queries(), 0);
    }

    #[tokio::test]
    async fn update_all_runs_in_order() {
        let db = Arc::new(TableDatabase::default());
        let mut cache = SnapshotCache::new(db.clone(), "", TWO_TABLES);

        cache
            .update_all(&["sessions", "members"])
            .await
            .expect("update all");
        assert_eq!(
            db.issued(),
            vec!["SELECT * FROM sessions", "SELECT * FROM members"]
        );
    }

    #[tokio::test]
    async fn get_all_maps_aliases() {
        let db = Arc::new(TableDatabase::with_rows("members", 2));
        let mut cache = SnapshotCache::new(db, "", TWO_TABLES);
        cache.build().await.expect("build");

        let set = cache.get_all(&[("people", "members"), ("other", "posts")]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("people").len(), 2);
        assert!(set.get("other").is_empty());
        assert!(set.get("missing").is_empty());

        let ids: Vec<serde_json::Value> = set.decode("people").expect("decode");
        assert_eq!(ids.len(), 2);
        assert!(set.decode::<serde_json::Value>("other").expect("empty").is_empty());
    }
}
