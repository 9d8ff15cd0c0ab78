//! Schema-evolving relational sink.
//!
//! Persists batches of heterogeneous [`Record`]s into named SQLite tables.
//! Every column is created `TEXT` and nullable; values are bound with their
//! scalar type and stored under text affinity.
//!
//! # Write modes
//!
//! - [`WriteMode::Replace`] drops the table and recreates it with exactly the
//!   batch's columns, all in one transaction.
//! - [`WriteMode::Append`] creates the table if absent (`IF NOT EXISTS`, so a
//!   concurrent creator is not an error), then adds each missing column with
//!   its own `ALTER TABLE ... ADD COLUMN`, re-reading the table's columns
//!   right before every alteration so that a column added by another process
//!   in the meantime is not added twice. Rows are then inserted in one
//!   transaction.
//!
//! Columns are never dropped, renamed or retyped in append mode. If a batch
//! fails after some alterations, those columns stay: the table ends up with
//! a superset of the columns it had, never fewer.
//!
//! SQLite compares identifiers case-insensitively (ASCII), so column names
//! are matched the same way here.

use async_trait::async_trait;
use indexmap::IndexSet;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::errors::SinkError;
use crate::models::{FieldValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Replace,
    Append,
}

/// Destination for normalized record batches.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist `records` into `table`, returning the number of rows written.
    async fn write(&self, table: &str, records: &[Record], mode: WriteMode)
        -> Result<u64, SinkError>;
}

/// [`RecordSink`] over an SQLite pool.
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool, SinkError> {
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_err(table, e))
    }

    /// Current column names in declaration order (empty if no such table).
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>, SinkError> {
        sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_err(table, e))
    }

    /// User tables, alphabetically.
    pub async fn list_tables(&self) -> Result<Vec<String>, SinkError> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_err("sqlite_master", e))
    }

    pub async fn row_count(&self, table: &str) -> Result<i64, SinkError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table, table)?);
        sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_err(table, e))
    }

    /// All rows of `table` in insertion order, every value read as text.
    pub async fn read_rows(
        &self,
        table: &str,
    ) -> Result<(Vec<String>, Vec<Vec<Option<String>>>), SinkError> {
        let columns = self.table_columns(table).await?;
        let sql = format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table, table)?);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_err(table, e))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let value: Option<String> = row.try_get(i).map_err(|e| query_err(table, e))?;
                values.push(value);
            }
            out.push(values);
        }
        Ok((columns, out))
    }

    async fn replace(&self, table: &str, columns: &[String], records: &[Record]) -> Result<u64, SinkError> {
        let quoted = quote_ident(table, table)?;
        let mut tx = self.pool.begin().await.map_err(|e| query_err(table, e))?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quoted))
            .execute(&mut *tx)
            .await
            .map_err(|e| schema_err(table, e))?;
        sqlx::query(&create_table_sql(table, columns)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| schema_err(table, e))?;

        let written = insert_rows(&mut tx, table, columns, records).await?;
        tx.commit().await.map_err(|e| query_err(table, e))?;
        Ok(written)
    }

    async fn append(&self, table: &str, columns: &[String], records: &[Record]) -> Result<u64, SinkError> {
        // Another writer may create the table between the check and the
        // CREATE, possibly with fewer columns; both cases end in the ALTER pass.
        if !self.table_exists(table).await? {
            sqlx::query(&create_table_sql(table, columns)?)
                .execute(&self.pool)
                .await
                .map_err(|e| schema_err(table, e))?;
            info!(table, columns = columns.len(), "created table");
        }
        self.add_missing_columns(table, columns).await?;

        let mut tx = self.pool.begin().await.map_err(|e| query_err(table, e))?;
        let written = insert_rows(&mut tx, table, columns, records).await?;
        tx.commit().await.map_err(|e| query_err(table, e))?;
        Ok(written)
    }

    /// Add every column of `columns` the table lacks. Returns the added names.
    pub async fn add_missing_columns(
        &self,
        table: &str,
        columns: &[String],
    ) -> Result<Vec<String>, SinkError> {
        let existing = self.table_columns(table).await?;
        let missing: Vec<&String> = columns
            .iter()
            .filter(|c| !contains_ident(&existing, c))
            .collect();

        let mut added = Vec::new();
        for column in missing {
            // Re-read right before altering; another writer may have added it.
            let current = self.table_columns(table).await?;
            if contains_ident(&current, column) {
                continue;
            }

            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} TEXT",
                quote_ident(table, table)?,
                quote_ident(table, column)?
            );
            if let Err(e) = sqlx::query(&sql).execute(&self.pool).await {
                let after = self.table_columns(table).await?;
                if contains_ident(&after, column) {
                    continue;
                }
                return Err(schema_err(table, e));
            }
            info!(table, column = column.as_str(), "added column");
            added.push(column.clone());
        }
        Ok(added)
    }
}

#[async_trait]
impl RecordSink for SqliteSink {
    async fn write(
        &self,
        table: &str,
        records: &[Record],
        mode: WriteMode,
    ) -> Result<u64, SinkError> {
        if records.is_empty() {
            debug!(table, ?mode, "empty batch, nothing to write");
            return Ok(0);
        }

        let columns = batch_columns(records);
        for column in &columns {
            quote_ident(table, column)?;
        }

        let written = match mode {
            WriteMode::Replace => self.replace(table, &columns, records).await?,
            WriteMode::Append => self.append(table, &columns, records).await?,
        };
        info!(table, rows = written, ?mode, "wrote batch");
        Ok(written)
    }
}

async fn insert_rows(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    table: &str,
    columns: &[String],
    records: &[Record],
) -> Result<u64, SinkError> {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(table, c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table, table)?,
        column_list,
        placeholders
    );

    let mut written = 0u64;
    for (row, record) in records.iter().enumerate() {
        let mut query = sqlx::query(&sql);
        for column in columns {
            query = bind_value(query, field(record, column));
        }
        query
            .execute(&mut **tx)
            .await
            .map_err(|source| SinkError::Insert {
                table: table.to_string(),
                row,
                source,
            })?;
        written += 1;
    }
    Ok(written)
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Option<&'q FieldValue>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        None | Some(FieldValue::Null) => query.bind(None::<String>),
        Some(FieldValue::Bool(b)) => query.bind(*b),
        Some(FieldValue::Integer(i)) => query.bind(*i),
        Some(FieldValue::Float(f)) => query.bind(*f),
        Some(FieldValue::Text(s)) => query.bind(s.as_str()),
    }
}

/// Value of `column` in `record`, matching the name case-insensitively.
fn field<'a>(record: &'a Record, column: &str) -> Option<&'a FieldValue> {
    record.get(column).or_else(|| {
        record
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(column))
            .map(|(_, v)| v)
    })
}

/// Union of the batch's field names in first-seen order.
fn batch_columns(records: &[Record]) -> Vec<String> {
    let mut seen: IndexSet<String> = IndexSet::new();
    let mut columns = Vec::new();
    for record in records {
        for key in record.keys() {
            if seen.insert(key.to_ascii_lowercase()) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn contains_ident(names: &[String], name: &str) -> bool {
    names.iter().any(|n| n.eq_ignore_ascii_case(name))
}

fn create_table_sql(table: &str, columns: &[String]) -> Result<String, SinkError> {
    let defs = columns
        .iter()
        .map(|c| quote_ident(table, c).map(|q| format!("{} TEXT", q)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table, table)?,
        defs.join(", ")
    ))
}

/// Double-quote an identifier, doubling embedded quotes.
fn quote_ident(table: &str, name: &str) -> Result<String, SinkError> {
    if name.is_empty() || name.contains('\0') {
        return Err(SinkError::InvalidIdentifier {
            table: table.to_string(),
            name: name.to_string(),
        });
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

fn query_err(table: &str, source: sqlx::Error) -> SinkError {
    SinkError::Query {
        table: table.to_string(),
        source,
    }
}

fn schema_err(table: &str, source: sqlx::Error) -> SinkError {
    SinkError::Schema {
        table: table.to_string(),
        source,
    }
}
