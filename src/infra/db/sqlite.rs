use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value;
use sqlx::{
    Column, Connection, Row, Sqlite, TypeInfo, ValueRef,
    pool::PoolConnection,
    query::Query,
    sqlite::{SqliteArguments, SqliteConnection, SqlitePool, SqliteRow},
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::DatabaseDriver;

use super::{
    DataError, DatabaseProvider, Record, ResultSet, SqlValue, Statement, record_query,
    util::{map_sqlx_error, returns_rows},
};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

pub struct SqliteDatabase {
    pool: SqlitePool,
    connection: Mutex<Option<PoolConnection<Sqlite>>>,
    queries: AtomicU64,
}

impl SqliteDatabase {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            connection: Mutex::new(None),
            queries: AtomicU64::new(0),
        }
    }

    fn count(&self, sql: &str) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        record_query(DatabaseDriver::Sqlite, sql);
    }
}

#[async_trait]
impl DatabaseProvider for SqliteDatabase {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    async fn connect(&self) -> Result<(), DataError> {
        let mut slot = self.connection.lock().await;
        if slot.is_none() {
            *slot = Some(self.pool.acquire().await.map_err(map_sqlx_error)?);
            debug!(target = "bulletin_fusion::infra::db", driver = "sqlite", "Connection acquired");
        }
        Ok(())
    }

    async fn query(&self, sql: &str, values: &[SqlValue]) -> Result<ResultSet, DataError> {
        let mut slot = self.connection.lock().await;
        let connection = slot.as_mut().ok_or(DataError::NotConnected)?;
        self.count(sql);
        run_statement(connection, sql, values).await
    }

    async fn transaction(&self, statements: &[Statement]) -> Result<Vec<ResultSet>, DataError> {
        let mut slot = self.connection.lock().await;
        let connection = slot.as_mut().ok_or(DataError::NotConnected)?;
        let mut tx = Connection::begin(&mut **connection)
            .await
            .map_err(map_sqlx_error)?;

        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            self.count(&statement.sql);
            match run_statement(&mut tx, &statement.sql, &statement.values).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(
                            target = "bulletin_fusion::infra::db",
                            error = %rollback,
                            "Rollback failed"
                        );
                    }
                    return Err(err);
                }
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(results)
    }

    async fn disconnect(&self) {
        if self.connection.lock().await.take().is_some() {
            debug!(target = "bulletin_fusion::infra::db", driver = "sqlite", "Connection released");
        }
    }

    async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    fn total_queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

async fn run_statement(
    connection: &mut SqliteConnection,
    sql: &str,
    values: &[SqlValue],
) -> Result<ResultSet, DataError> {
    let query = values
        .iter()
        .fold(sqlx::query(sql), |query, value| bind(query, value));

    if returns_rows(sql) {
        let rows = query
            .fetch_all(&mut *connection)
            .await
            .map_err(map_sqlx_error)?;
        let records = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
        Ok(ResultSet::from_rows(records))
    } else {
        let done = query
            .execute(&mut *connection)
            .await
            .map_err(map_sqlx_error)?;
        Ok(ResultSet::from_execution(
            done.rows_affected(),
            Some(done.last_insert_rowid()),
        ))
    }
}

fn bind<'q>(query: SqliteQuery<'q>, value: &SqlValue) -> SqliteQuery<'q> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(flag) => query.bind(*flag),
        SqlValue::Int(number) => query.bind(*number),
        SqlValue::Float(number) => query.bind(*number),
        SqlValue::Text(text) => query.bind(text.clone()),
    }
}

fn decode_row(row: &SqliteRow) -> Result<Record, DataError> {
    let mut record = Record::default();

    for column in row.columns() {
        let index = column.ordinal();
        let name = column.name();
        let raw = row.try_get_raw(index).map_err(map_sqlx_error)?;
        if raw.is_null() {
            record.insert(name, Value::Null);
            continue;
        }

        // Storage class of the value itself; declared column types are advisory in SQLite.
        let storage = raw.type_info().name().to_string();
        let value = match storage.as_str() {
            "INTEGER" | "BOOLEAN" => Value::from(
                row.try_get_unchecked::<i64, _>(index)
                    .map_err(map_sqlx_error)?,
            ),
            "REAL" | "NUMERIC" => Value::from(
                row.try_get_unchecked::<f64, _>(index)
                    .map_err(map_sqlx_error)?,
            ),
            "BLOB" => {
                let bytes = row
                    .try_get_unchecked::<Vec<u8>, _>(index)
                    .map_err(map_sqlx_error)?;
                Value::from(STANDARD.encode(bytes))
            }
            _ => Value::from(
                row.try_get_unchecked::<String, _>(index)
                    .map_err(map_sqlx_error)?,
            ),
        };
        record.insert(name, value);
    }

    Ok(record)
}
