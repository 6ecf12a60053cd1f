//! SQLite-backed store for fixtures. Serves every mode: executing a rendered
//! script, row-by-row inserts, cleanup and read-back verification.

use std::path::Path;

use log::{info, warn};
use rusqlite::types::Value;
use rusqlite::{params, Connection};
use rust_decimal::prelude::*;

use crate::error::{PersistenceError, VerificationQueryError};
use crate::order::OrderFixture;
use crate::rows::{Cleanup, RowStore};
use crate::script::{format_timestamp, validate_table, COLUMNS};
use crate::verify::{parse_timestamp, OrderFilter, PayoutRecord, RecordSource};

/// Everything a backend needs to take part in a full generate/insert/verify run
pub trait OrderStore: RowStore + Cleanup + RecordSource {}

impl<T: RowStore + Cleanup + RecordSource> OrderStore for T {}

const ROW_SAVEPOINT: &str = "fixture_row";
/// Binds the type tag as `?1` and the optional order number prefix as `?2`.
/// The prefix is compared literally, so `%` and `_` are not wildcards.
const FILTER_CLAUSE: &str =
    "type = ?1 AND (?2 IS NULL OR substr(order_no, 1, length(?2)) = ?2)";

pub struct SqliteStore {
    conn: Connection,
    table: String,
    in_batch: bool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Errors when `table` is not a plain identifier or the file cannot be opened
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, PersistenceError> {
        validate_table(table)?;
        let conn = Connection::open(path)?;
        Ok(SqliteStore::with_connection(conn, table))
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Errors when `table` is not a plain identifier
    pub fn in_memory(table: &str) -> Result<Self, PersistenceError> {
        validate_table(table)?;
        let conn = Connection::open_in_memory()?;
        Ok(SqliteStore::with_connection(conn, table))
    }

    fn with_connection(conn: Connection, table: &str) -> Self {
        SqliteStore {
            conn,
            table: table.to_owned(),
            in_batch: false,
        }
    }

    /// Creates the orders table if it is missing. `order_no` is unique so
    /// duplicates surface as row errors.
    ///
    /// # Errors
    /// Errors when the statement fails
    pub fn create_orders_table(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_no TEXT NOT NULL UNIQUE,
                type TEXT NOT NULL,
                amount NUMERIC NOT NULL,
                commission NUMERIC,
                status TEXT NOT NULL,
                payment_method TEXT,
                payment_account TEXT,
                created_at TEXT NOT NULL,
                expires_at TEXT,
                updated_at TEXT
            );",
            self.table
        ))?;
        Ok(())
    }

    /// Runs a rendered script as a single transaction. Any failing statement
    /// rolls back the whole script; nothing is partially applied.
    ///
    /// # Errors
    /// Errors with [`PersistenceError::Script`] when any statement fails
    pub fn execute_script(&mut self, script: &str) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(script).map_err(PersistenceError::Script)?;
        tx.commit().map_err(PersistenceError::Script)?;
        info!("Applied SQL script ({} bytes)", script.len());
        Ok(())
    }

    /// # Errors
    /// Errors when the count query fails
    pub fn count_by_type(&self, type_tag: &str) -> Result<usize, PersistenceError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE type = ?1", self.table),
            params![type_tag],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn insert_statement(&self) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            self.table,
            COLUMNS.join(", ")
        )
    }
}

impl RowStore for SqliteStore {
    fn begin_batch(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch("BEGIN")?;
        self.in_batch = true;
        Ok(())
    }

    fn insert_row(&mut self, fixture: &OrderFixture) -> Result<(), PersistenceError> {
        self.conn
            .execute_batch(&format!("SAVEPOINT {}", ROW_SAVEPOINT))?;
        let inserted = self.conn.execute(
            &self.insert_statement(),
            params![
                fixture.order_no,
                fixture.order_type,
                fixture.amount.to_string(),
                fixture.commission.to_string(),
                fixture.status.as_str(),
                fixture.payment_method.as_str(),
                fixture.payment_account,
                format_timestamp(fixture.created_at),
                format_timestamp(fixture.expires_at),
                format_timestamp(fixture.updated_at),
            ],
        );
        match inserted {
            Ok(_) => {
                self.conn
                    .execute_batch(&format!("RELEASE {}", ROW_SAVEPOINT))?;
                Ok(())
            }
            Err(e) => {
                self.conn.execute_batch(&format!(
                    "ROLLBACK TO {0}; RELEASE {0}",
                    ROW_SAVEPOINT
                ))?;
                Err(e.into())
            }
        }
    }

    fn commit_batch(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch("COMMIT")?;
        self.in_batch = false;
        Ok(())
    }
}

impl Cleanup for SqliteStore {
    fn delete_matching(&mut self, filter: &OrderFilter) -> Result<usize, PersistenceError> {
        let deleted = self.conn.execute(
            &format!("DELETE FROM {} WHERE {}", self.table, FILTER_CLAUSE),
            params![filter.type_tag, filter.order_no_prefix],
        )?;
        info!(
            "Deleted {} `{}` rows from {} (prefix {:?})",
            deleted, filter.type_tag, self.table, filter.order_no_prefix
        );
        Ok(deleted)
    }
}

impl RecordSource for SqliteStore {
    fn fetch(&self, filter: &OrderFilter) -> Result<Vec<PayoutRecord>, VerificationQueryError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT order_no, status, payment_method, amount, commission, created_at, expires_at
             FROM {} WHERE {} ORDER BY order_no",
            self.table, FILTER_CLAUSE
        ))?;
        let rows = stmt
            .query_map(params![filter.type_tag, filter.order_no_prefix], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Value>(3)?,
                    row.get::<_, Value>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(order_no, status, payment_method, amount, commission, created_at, expires_at)|
                 -> Result<PayoutRecord, VerificationQueryError> {
                    Ok(PayoutRecord {
                        order_no,
                        status,
                        payment_method,
                        amount: decimal_from_value(&amount)?.ok_or_else(|| {
                            VerificationQueryError::Malformed("null amount".to_owned())
                        })?,
                        commission: decimal_from_value(&commission)?,
                        created_at: timestamp_from_column(created_at)?,
                        expires_at: timestamp_from_column(expires_at)?,
                    })
                },
            )
            .collect()
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if self.in_batch {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("Failed to roll back open batch: {}", e);
            }
        }
    }
}

fn decimal_from_value(value: &Value) -> Result<Option<Decimal>, VerificationQueryError> {
    let decimal = match value {
        Value::Null => return Ok(None),
        Value::Integer(i) => Some(Decimal::from(*i)),
        Value::Real(f) => Decimal::from_f64(*f),
        Value::Text(s) => Decimal::from_str(s).ok(),
        Value::Blob(_) => None,
    };
    decimal
        .map(|d| Some(d.round_dp(2)))
        .ok_or_else(|| VerificationQueryError::Malformed(format!("not a decimal: {:?}", value)))
}

fn timestamp_from_column(
    value: Option<String>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, VerificationQueryError> {
    value
        .map(|s| {
            parse_timestamp(&s)
                .ok_or_else(|| VerificationQueryError::Malformed(format!("bad timestamp `{}`", s)))
        })
        .transpose()
}
