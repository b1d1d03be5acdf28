//! Visitor sessions: the per-request session state and the data store behind it.
//!
//! The `sessions` table records who is online; arbitrary per-visitor values
//! (CSRF tokens, the member token) live in the session data store, which is
//! either the `session_store` table or a process-wide in-memory map.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::{SessionSettings, SessionStoreMethod},
    domain::sessions::SessionRecord,
    infra::db::{DataError, QueryBuilder, SqlValue},
};

pub const SESSION_DATA_TABLE: &str = "session_store";

/// Cookie names, before the configured prefix is applied.
pub const SESSION_COOKIE: &str = "Session";
pub const MEMBER_TOKEN_COOKIE: &str = "MemberToken";
pub const DEVICE_COOKIE: &str = "DeviceId";

/// Session data key mirroring the signed-in member's token.
pub const MEMBER_TOKEN_KEY: &str = "MemberToken";

pub fn generate_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Session row plus its key/value data for the current request.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub record: SessionRecord,
    data: Map<String, Value>,
    is_new: bool,
    destroyed: bool,
}

impl SessionState {
    pub fn new(record: SessionRecord, data: Map<String, Value>, is_new: bool) -> Self {
        Self {
            record,
            data,
            is_new,
            destroyed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// True when the visitor arrived without a known session id.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove_data(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Drop all data and start over under a fresh id.
    pub fn regenerate(&mut self) {
        self.record.id = generate_session_id();
        self.data.clear();
        self.is_new = true;
    }

    pub fn mark_destroyed(&mut self) {
        self.data.clear();
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

#[derive(Debug, Clone)]
pub struct StoredSession {
    data: Map<String, Value>,
    expires: i64,
}

/// Backing store for session data.
#[derive(Debug, Clone)]
pub enum SessionStore {
    Database {
        lifetime_secs: i64,
    },
    Memory {
        lifetime_secs: i64,
        entries: Arc<DashMap<String, StoredSession>>,
    },
}

impl SessionStore {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        let lifetime_secs = i64::try_from(settings.lifetime.as_secs()).unwrap_or(i64::MAX);
        match settings.store {
            SessionStoreMethod::Database => SessionStore::Database { lifetime_secs },
            SessionStoreMethod::Memory => SessionStore::memory(lifetime_secs),
        }
    }

    pub fn memory(lifetime_secs: i64) -> Self {
        SessionStore::Memory {
            lifetime_secs,
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn method(&self) -> SessionStoreMethod {
        match self {
            SessionStore::Database { .. } => SessionStoreMethod::Database,
            SessionStore::Memory { .. } => SessionStoreMethod::Memory,
        }
    }

    fn lifetime_secs(&self) -> i64 {
        match self {
            SessionStore::Database { lifetime_secs } | SessionStore::Memory { lifetime_secs, .. } => {
                *lifetime_secs
            }
        }
    }

    /// Data for `id`, or `None` when unknown or expired.
    pub async fn read(
        &self,
        builder: &mut QueryBuilder,
        id: &str,
        now: i64,
    ) -> Result<Option<Map<String, Value>>, DataError> {
        match self {
            SessionStore::Memory { entries, .. } => Ok(entries
                .get(id)
                .filter(|entry| entry.expires >= now)
                .map(|entry| entry.data.clone())),
            SessionStore::Database { .. } => {
                builder
                    .reset()
                    .select("data")
                    .from(SESSION_DATA_TABLE, None)
                    .filter(
                        "id = ? AND lifetime >= ?",
                        [SqlValue::from(id), SqlValue::from(now)],
                    )
                    .limit(1, 0);
                let result = builder.execute().await;
                builder.reset();

                let Some(row) = result?.fetch().cloned() else {
                    return Ok(None);
                };
                let raw = row.get_str("data").unwrap_or_default();
                if raw.trim().is_empty() {
                    return Ok(Some(Map::new()));
                }
                match serde_json::from_str::<Map<String, Value>>(raw) {
                    Ok(data) => Ok(Some(data)),
                    Err(err) => {
                        warn!(
                            target = "bulletin_fusion::application::session",
                            session_id = id,
                            error = %err,
                            "Discarding unreadable session data"
                        );
                        Ok(Some(Map::new()))
                    }
                }
            }
        }
    }

    pub async fn write(
        &self,
        builder: &mut QueryBuilder,
        id: &str,
        data: &Map<String, Value>,
        now: i64,
    ) -> Result<(), DataError> {
        let expires = now.saturating_add(self.lifetime_secs());
        match self {
            SessionStore::Memory { entries, .. } => {
                entries.insert(
                    id.to_string(),
                    StoredSession {
                        data: data.clone(),
                        expires,
                    },
                );
                Ok(())
            }
            SessionStore::Database { .. } => {
                let payload = Value::Object(data.clone()).to_string();

                builder
                    .reset()
                    .update(SESSION_DATA_TABLE)
                    .set([
                        ("data", SqlValue::from(payload.as_str())),
                        ("lifetime", SqlValue::from(expires)),
                    ])
                    .filter("id = ?", [id]);
                let updated = builder.execute_transaction().await;
                builder.reset();

                if updated?.rows_affected() > 0 {
                    return Ok(());
                }

                builder
                    .reset()
                    .insert(SESSION_DATA_TABLE, &["id", "data", "lifetime"])
                    .values([
                        SqlValue::from(id),
                        SqlValue::from(payload),
                        SqlValue::from(expires),
                    ]);
                let inserted = builder.execute_transaction().await;
                builder.reset();
                inserted.map(|_| ())
            }
        }
    }

    pub async fn destroy(&self, builder: &mut QueryBuilder, id: &str) -> Result<(), DataError> {
        match self {
            SessionStore::Memory { entries, .. } => {
                entries.remove(id);
                Ok(())
            }
            SessionStore::Database { .. } => {
                builder
                    .reset()
                    .delete(SESSION_DATA_TABLE)
                    .filter("id = ?", [id]);
                let result = builder.execute_transaction().await;
                builder.reset();
                result.map(|_| ())
            }
        }
    }

    /// Remove expired entries; returns how many were dropped.
    pub async fn collect_garbage(
        &self,
        builder: &mut QueryBuilder,
        now: i64,
    ) -> Result<u64, DataError> {
        match self {
            SessionStore::Memory { entries, .. } => {
                let before = entries.len();
                entries.retain(|_, entry| entry.expires >= now);
                Ok((before - entries.len()) as u64)
            }
            SessionStore::Database { .. } => {
                builder
                    .reset()
                    .delete(SESSION_DATA_TABLE)
                    .filter("lifetime < ?", [now]);
                let result = builder.execute_transaction().await;
                builder.reset();
                Ok(result?.rows_affected())
            }
        }
    }
}
