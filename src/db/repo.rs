use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, QueryBuilder, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use std::str::FromStr;
use tracing::{debug, instrument};

use super::model::{ColumnValue, RecordRow};
use crate::source::RecordSource;

pub type Pool = SqlitePool;

/// Open a read-only pool. The sitemap never writes to the database.
pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)?.read_only(true);
    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and rebuild the
/// URL in `sqlite://` form. In-memory and non-sqlite URLs pass through.
pub fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Raw(String),
    Eq(String, ColumnValue),
}

/// A `SELECT` over a single table, narrowed by scope functions.
///
/// Identifiers and raw fragments are written into the SQL as given; only
/// values passed to [`RecordQuery::and_where_eq`] are bound as parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    table: String,
    columns: Vec<String>,
    conditions: Vec<Condition>,
    order_by: Option<String>,
    limit: Option<u32>,
}

impl RecordQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            conditions: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Replace the selected columns. An empty list selects `*`.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn and_where(mut self, fragment: impl Into<String>) -> Self {
        self.conditions.push(Condition::Raw(fragment.into()));
        self
    }

    pub fn and_where_eq(mut self, column: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        self.conditions
            .push(Condition::Eq(column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn to_builder(&self) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new("SELECT ");
        if self.columns.is_empty() {
            qb.push("*");
        } else {
            qb.push(self.columns.join(", "));
        }
        qb.push(" FROM ");
        qb.push(&self.table);

        for (i, cond) in self.conditions.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            match cond {
                Condition::Raw(fragment) => {
                    qb.push("(");
                    qb.push(fragment);
                    qb.push(")");
                }
                Condition::Eq(column, value) => {
                    qb.push(column);
                    match value {
                        ColumnValue::Null => {
                            qb.push(" IS NULL");
                        }
                        ColumnValue::Integer(v) => {
                            qb.push(" = ");
                            qb.push_bind(*v);
                        }
                        ColumnValue::Real(v) => {
                            qb.push(" = ");
                            qb.push_bind(*v);
                        }
                        ColumnValue::Text(v) => {
                            qb.push(" = ");
                            qb.push_bind(v.clone());
                        }
                    }
                }
            }
        }

        if let Some(order) = &self.order_by {
            qb.push(" ORDER BY ");
            qb.push(order);
        }
        if let Some(limit) = self.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(limit));
        }
        qb
    }

    pub fn to_sql(&self) -> String {
        self.to_builder().sql().to_string()
    }
}

#[instrument(skip_all, fields(table = %query.table_name()))]
pub async fn fetch_records(pool: &Pool, query: &RecordQuery) -> Result<Vec<RecordRow>> {
    let mut qb = query.to_builder();
    debug!(sql = qb.sql(), "fetching records");
    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(decode_row).collect()
}

fn decode_row(row: &SqliteRow) -> Result<RecordRow> {
    let mut out = RecordRow::default();
    for column in row.columns() {
        let value = decode_column(row, column.ordinal())?;
        out.push(column.name(), value);
    }
    Ok(out)
}

fn decode_column(row: &SqliteRow, idx: usize) -> Result<ColumnValue> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(ColumnValue::Null);
    }
    let storage = raw.type_info().name().to_string();
    let value = match storage.as_str() {
        "INTEGER" => ColumnValue::Integer(row.try_get::<i64, _>(idx)?),
        "REAL" => ColumnValue::Real(row.try_get::<f64, _>(idx)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(idx)?;
            ColumnValue::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => ColumnValue::Text(row.try_get::<String, _>(idx)?),
    };
    Ok(value)
}

/// Record source over one SQLite table.
#[derive(Debug, Clone)]
pub struct TableSource {
    pool: Pool,
    table: String,
}

impl TableSource {
    pub fn new(pool: Pool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }
}

#[async_trait]
impl RecordSource for TableSource {
    type Record = RecordRow;
    type Query = RecordQuery;

    fn query(&self) -> RecordQuery {
        RecordQuery::table(&self.table)
    }

    async fn fetch_all(&self, query: RecordQuery) -> Result<Vec<RecordRow>> {
        fetch_records(&self.pool, &query).await
    }
}
