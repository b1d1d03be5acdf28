use std::sync::Arc;

use crate::{
    application::{context::RequestData, session::SessionStore},
    cache::CacheRegistry,
    config::Settings,
    infra::db::DatabasePool,
};

/// Process-wide collaborators shared by every request.
pub struct AppServices {
    pub config: Settings,
    pub pool: DatabasePool,
    pub registry: CacheRegistry,
    pub session_store: SessionStore,
}

impl AppServices {
    pub fn new(config: Settings, pool: DatabasePool) -> Arc<Self> {
        let session_store = SessionStore::from_settings(&config.session);
        Arc::new(Self {
            config,
            pool,
            registry: CacheRegistry::standard(),
            session_store,
        })
    }

    pub fn table_prefix(&self) -> &str {
        &self.config.database.table_prefix
    }

    pub fn cookie_name(&self, name: &str) -> String {
        format!("{}{name}", self.config.cookies.prefix)
    }

    /// A fresh per-request database handle with an empty snapshot cache.
    pub fn request_data(&self) -> RequestData {
        RequestData::new(self.pool.provider(), self.table_prefix(), self.registry)
    }
}
