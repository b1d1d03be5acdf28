//! Fluent SQL builder.
//!
//! Fragments are stored per clause and joined in a fixed precedence when the
//! statement is built, so the order of calls never changes the shape of the SQL.
//! Bound values are kept per clause as well and flattened in the same precedence,
//! which keeps them aligned with their placeholders left to right.

use std::{fmt, sync::Arc};

use tracing::trace;

use super::{BuilderError, DataError, DatabaseProvider, ResultSet, SqlValue, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Cross => "CROSS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Fragments {
    select: String,
    update: String,
    delete: String,
    insert: String,
    set: Vec<String>,
    from: Vec<String>,
    join: Vec<String>,
    conditions: Vec<String>,
    group_by: Vec<String>,
    having: Vec<String>,
    order_by: Vec<String>,
    limit: Option<(u64, u64)>,
    placeholders: usize,
}

#[derive(Debug, Default, Clone)]
struct BoundValues {
    set: Vec<SqlValue>,
    conditions: Vec<SqlValue>,
    having: Vec<SqlValue>,
    values: Vec<SqlValue>,
}

pub struct QueryBuilder {
    db: Arc<dyn DatabaseProvider>,
    prefix: String,
    parts: Fragments,
    bound: BoundValues,
    query: String,
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("prefix", &self.prefix)
            .field("query", &self.to_sql())
            .finish_non_exhaustive()
    }
}

impl QueryBuilder {
    pub fn new(db: Arc<dyn DatabaseProvider>, prefix: impl Into<String>) -> Self {
        Self {
            db,
            prefix: prefix.into(),
            parts: Fragments::default(),
            bound: BoundValues::default(),
            query: String::new(),
        }
    }

    pub fn database(&self) -> &Arc<dyn DatabaseProvider> {
        &self.db
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefixed table name.
    pub fn table(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    fn aliased(&self, name: &str, alias: Option<&str>) -> String {
        match alias {
            Some(alias) => format!("{} AS {alias}", self.table(name)),
            None => self.table(name),
        }
    }

    pub fn select(&mut self, columns: &str) -> &mut Self {
        self.parts.select = format!("SELECT {columns}");
        self
    }

    pub fn select_columns(&mut self, columns: &[&str]) -> &mut Self {
        self.parts.select = format!("SELECT {}", columns.join(", "));
        self
    }

    pub fn count(&mut self, column: &str, alias: &str) -> &mut Self {
        self.parts.select = format!("SELECT COUNT({column}) AS {alias}");
        self
    }

    /// Repeated calls list additional tables.
    pub fn from(&mut self, table: &str, alias: Option<&str>) -> &mut Self {
        let entry = self.aliased(table, alias);
        self.parts.from.push(entry);
        self
    }

    pub fn join(
        &mut self,
        kind: JoinKind,
        table: &str,
        condition: &str,
        alias: Option<&str>,
    ) -> &mut Self {
        let target = self.aliased(table, alias);
        let clause = match kind {
            JoinKind::Cross => format!("CROSS JOIN {target}"),
            other => format!("{} JOIN {target} ON {condition}", other.as_str()),
        };
        self.parts.join.push(clause);
        self
    }

    /// `WHERE` condition; repeated calls are joined with `AND`.
    pub fn filter<I>(&mut self, condition: &str, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        self.parts.conditions.push(condition.to_string());
        self.bound
            .conditions
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn group_by(&mut self, column: &str) -> &mut Self {
        self.parts.group_by.push(column.to_string());
        self
    }

    /// `HAVING` condition; repeated calls are joined with `AND`.
    pub fn having<I>(&mut self, condition: &str, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        self.parts.having.push(condition.to_string());
        self.bound.having.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn order_by(&mut self, column: &str, direction: SortDirection) -> &mut Self {
        self.parts
            .order_by
            .push(format!("{column} {}", direction.as_str()));
        self
    }

    pub fn limit(&mut self, limit: u64, offset: u64) -> &mut Self {
        self.parts.limit = Some((limit, offset));
        self
    }

    pub fn update(&mut self, table: &str) -> &mut Self {
        self.parts.update = format!("UPDATE {}", self.table(table));
        self
    }

    /// `SET col = ?` for each pair, in the order given.
    pub fn set<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<SqlValue>,
    {
        for (column, value) in pairs {
            self.parts.set.push(format!("{} = ?", column.as_ref()));
            self.bound.set.push(value.into());
        }
        self
    }

    pub fn delete(&mut self, table: &str) -> &mut Self {
        self.parts.delete = format!("DELETE FROM {}", self.table(table));
        self
    }

    pub fn insert(&mut self, table: &str, columns: &[&str]) -> &mut Self {
        let mut clause = format!("INSERT INTO {}", self.table(table));
        if !columns.is_empty() {
            clause.push_str(&format!(" ({})", columns.join(", ")));
        }
        self.parts.insert = clause;
        self
    }

    /// Append one placeholder per value; repeated calls extend the row.
    pub fn values<I>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        let before = self.bound.values.len();
        self.bound.values.extend(values.into_iter().map(Into::into));
        self.parts.placeholders += self.bound.values.len() - before;
        self
    }

    /// Clear every fragment and bound value.
    pub fn reset(&mut self) -> &mut Self {
        self.parts = Fragments::default();
        self.bound = BoundValues::default();
        self.query.clear();
        self
    }

    /// The statement as it would be sent to the driver.
    pub fn to_sql(&self) -> String {
        let parts = &self.parts;
        let mut clauses: Vec<String> = vec![
            parts.select.clone(),
            parts.update.clone(),
            parts.delete.clone(),
            parts.insert.clone(),
        ];

        if !parts.set.is_empty() {
            clauses.push(format!("SET {}", parts.set.join(", ")));
        }
        if !parts.from.is_empty() {
            clauses.push(format!("FROM {}", parts.from.join(", ")));
        }
        clauses.extend(parts.join.iter().cloned());
        if !parts.conditions.is_empty() {
            clauses.push(format!("WHERE {}", parts.conditions.join(" AND ")));
        }
        if !parts.group_by.is_empty() {
            clauses.push(format!("GROUP BY {}", parts.group_by.join(", ")));
        }
        if !parts.having.is_empty() {
            clauses.push(format!("HAVING {}", parts.having.join(" AND ")));
        }
        if !parts.order_by.is_empty() {
            clauses.push(format!("ORDER BY {}", parts.order_by.join(", ")));
        }
        if let Some((limit, offset)) = parts.limit {
            clauses.push(format!("LIMIT {limit} OFFSET {offset}"));
        }
        if parts.placeholders > 0 {
            clauses.push(format!(
                "VALUES ({})",
                vec!["?"; parts.placeholders].join(", ")
            ));
        }

        clauses
            .into_iter()
            .filter(|clause| !clause.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }

    /// Bound values in placeholder order.
    pub fn bound_values(&self) -> Vec<SqlValue> {
        let bound = &self.bound;
        bound
            .set
            .iter()
            .chain(&bound.conditions)
            .chain(&bound.having)
            .chain(&bound.values)
            .cloned()
            .collect()
    }

    /// The statement built by the last `execute` or `execute_transaction`.
    pub fn last_query(&self) -> &str {
        &self.query
    }

    fn build(&mut self) -> Result<Statement, BuilderError> {
        self.query = self.to_sql();
        if self.query.trim().is_empty() {
            return Err(BuilderError::Empty);
        }

        let parts = &self.parts;
        if parts.select.is_empty()
            && parts.update.is_empty()
            && parts.delete.is_empty()
            && parts.insert.is_empty()
        {
            return Err(BuilderError::MissingStatement {
                query: self.query.clone(),
            });
        }

        trace!(
            target = "bulletin_fusion::infra::db::query_builder",
            sql = %self.query,
            "Built statement"
        );
        Ok(Statement::new(self.query.clone(), self.bound_values()))
    }

    pub async fn execute(&mut self) -> Result<ResultSet, DataError> {
        let statement = self.build()?;
        self.db.query(&statement.sql, &statement.values).await
    }

    /// Run the built statement inside its own transaction.
    pub async fn execute_transaction(&mut self) -> Result<ResultSet, DataError> {
        let statement = self.build()?;
        let mut results = self.db.transaction(std::slice::from_ref(&statement)).await?;
        Ok(results.pop().unwrap_or_default())
    }
}
