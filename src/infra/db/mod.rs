//! Database access shim.
//!
//! A [`DatabaseProvider`] is a per-request handle: it checks one connection out
//! of the process-wide pool on [`DatabaseProvider::connect`] and hands it back on
//! [`DatabaseProvider::disconnect`] (or when dropped). SQL is written with `?`
//! placeholders regardless of driver.

mod error;
mod postgres;
pub mod query_builder;
mod sqlite;
mod util;
mod value;

pub use error::{BuilderError, DataError};
pub use postgres::PostgresDatabase;
pub use query_builder::{JoinKind, QueryBuilder, SortDirection};
pub use sqlite::SqliteDatabase;
pub use util::map_sqlx_error;
pub use value::{Record, ResultSet, SqlValue, Statement};

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use metrics::counter;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};
use tracing::info;

use crate::config::{DatabaseDriver, DatabaseSettings};
use crate::infra::error::InfraError;

pub const METRIC_DB_QUERIES_TOTAL: &str = "bulletin_db_queries_total";

/// Per-request connection handle over a pooled driver.
#[async_trait]
pub trait DatabaseProvider: Send + Sync {
    fn driver(&self) -> DatabaseDriver;

    /// Check a connection out of the pool. Calling it twice is a no-op.
    async fn connect(&self) -> Result<(), DataError>;

    /// Run one statement with positional values.
    async fn query(&self, sql: &str, values: &[SqlValue]) -> Result<ResultSet, DataError>;

    /// Run the statements inside one transaction; any failure rolls all of them back.
    async fn transaction(&self, statements: &[Statement]) -> Result<Vec<ResultSet>, DataError>;

    /// Return the connection to the pool.
    async fn disconnect(&self);

    async fn is_connected(&self) -> bool;

    /// Statements issued through this handle so far.
    fn total_queries(&self) -> u64;
}

/// Process-wide connection pool for whichever driver is configured.
#[derive(Clone, Debug)]
pub enum DatabasePool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DatabasePool {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, InfraError> {
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| InfraError::configuration("database url is not configured"))?;
        let max_connections = settings.max_connections.get();

        let pool = match settings.driver {
            DatabaseDriver::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect(url)
                    .await
                    .map_err(|err| InfraError::database(err.to_string()))?;
                DatabasePool::Postgres(pool)
            }
            DatabaseDriver::Sqlite => {
                let options = SqliteConnectOptions::from_str(url)
                    .map_err(|err| InfraError::database(err.to_string()))?
                    .create_if_missing(true)
                    .foreign_keys(true);
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect_with(options)
                    .await
                    .map_err(|err| InfraError::database(err.to_string()))?;
                DatabasePool::Sqlite(pool)
            }
        };

        info!(
            target = "bulletin_fusion::infra::db",
            driver = settings.driver.as_str(),
            max_connections,
            "Database pool ready"
        );

        Ok(pool)
    }

    pub fn driver(&self) -> DatabaseDriver {
        match self {
            DatabasePool::Postgres(_) => DatabaseDriver::Postgres,
            DatabasePool::Sqlite(_) => DatabaseDriver::Sqlite,
        }
    }

    /// A fresh, not-yet-connected handle for one request.
    pub fn provider(&self) -> Arc<dyn DatabaseProvider> {
        match self {
            DatabasePool::Postgres(pool) => Arc::new(PostgresDatabase::new(pool.clone())),
            DatabasePool::Sqlite(pool) => Arc::new(SqliteDatabase::new(pool.clone())),
        }
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        match self {
            DatabasePool::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
            DatabasePool::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
        }
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::Postgres(pool) => pool.close().await,
            DatabasePool::Sqlite(pool) => pool.close().await,
        }
    }
}

fn record_query(driver: DatabaseDriver, sql: &str) {
    counter!(
        METRIC_DB_QUERIES_TOTAL,
        "driver" => driver.as_str(),
        "kind" => util::statement_kind(sql)
    )
    .increment(1);
}
