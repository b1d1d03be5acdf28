use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    Column, Connection, Postgres, Row, TypeInfo, ValueRef,
    pool::PoolConnection,
    postgres::{PgArguments, PgConnection, PgPool, PgRow},
    query::Query,
};
use time::{Date, OffsetDateTime, PrimitiveDateTime, format_description::well_known::Rfc3339};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DatabaseDriver;

use super::{
    DataError, DatabaseProvider, Record, ResultSet, SqlValue, Statement, record_query,
    util::{map_sqlx_error, number_placeholders, returns_rows},
};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

pub struct PostgresDatabase {
    pool: PgPool,
    connection: Mutex<Option<PoolConnection<Postgres>>>,
    queries: AtomicU64,
}

impl PostgresDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            connection: Mutex::new(None),
            queries: AtomicU64::new(0),
        }
    }

    fn count(&self, sql: &str) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        record_query(DatabaseDriver::Postgres, sql);
    }
}

#[async_trait]
impl DatabaseProvider for PostgresDatabase {
    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Postgres
    }

    async fn connect(&self) -> Result<(), DataError> {
        let mut slot = self.connection.lock().await;
        if slot.is_none() {
            *slot = Some(self.pool.acquire().await.map_err(map_sqlx_error)?);
            debug!(target = "bulletin_fusion::infra::db", driver = "postgres", "Connection acquired");
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
            debug!(target = "bulletin_fusion::infra::db", driver = "postgres", "Connection released");
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
    connection: &mut PgConnection,
    sql: &str,
    values: &[SqlValue],
) -> Result<ResultSet, DataError> {
    let numbered = number_placeholders(sql);
    let query = values
        .iter()
        .fold(sqlx::query(&numbered), |query, value| bind(query, value));

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
        Ok(ResultSet::from_execution(done.rows_affected(), None))
    }
}

fn bind<'q>(query: PgQuery<'q>, value: &SqlValue) -> PgQuery<'q> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(flag) => query.bind(*flag),
        SqlValue::Int(number) => query.bind(*number),
        SqlValue::Float(number) => query.bind(*number),
        SqlValue::Text(text) => query.bind(text.clone()),
    }
}

fn decode_row(row: &PgRow) -> Result<Record, DataError> {
    let mut record = Record::default();

    for column in row.columns() {
        let index = column.ordinal();
        let name = column.name();
        let raw = row.try_get_raw(index).map_err(map_sqlx_error)?;
        if raw.is_null() {
            record.insert(name, Value::Null);
            continue;
        }

        let value = match column.type_info().name() {
            "BOOL" => Value::from(get::<bool>(row, index)?),
            "INT2" => Value::from(get::<i16>(row, index)?),
            "INT4" => Value::from(get::<i32>(row, index)?),
            "INT8" => Value::from(get::<i64>(row, index)?),
            "FLOAT4" => Value::from(f64::from(get::<f32>(row, index)?)),
            "FLOAT8" => Value::from(get::<f64>(row, index)?),
            "JSON" | "JSONB" => get::<Value>(row, index)?,
            "UUID" => Value::from(get::<Uuid>(row, index)?.to_string()),
            "TIMESTAMPTZ" => {
                let stamp = get::<OffsetDateTime>(row, index)?;
                Value::from(
                    stamp
                        .format(&Rfc3339)
                        .map_err(|err| DataError::decode(name, err.to_string()))?,
                )
            }
            "TIMESTAMP" => Value::from(get::<PrimitiveDateTime>(row, index)?.to_string()),
            "DATE" => Value::from(get::<Date>(row, index)?.to_string()),
            _ => Value::from(get::<String>(row, index)?),
        };
        record.insert(name, value);
    }

    Ok(record)
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> Result<T, DataError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(index).map_err(map_sqlx_error)
}
