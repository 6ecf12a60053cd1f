//! Batch-script persistence: the whole fixture set rendered as one SQL text.
//!
//! A script is all-or-nothing. When it is executed (see
//! [`SqliteStore::execute_script`](crate::store::SqliteStore::execute_script))
//! any failing statement aborts and rolls back the entire batch, unlike the
//! row-by-row sink in [`rows`](crate::rows) which skips bad rows.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{ConfigurationError, ScriptError};
use crate::order::{OrderFixture, ORDER_TYPE};

pub const DEFAULT_TABLE: &str = "orders";

/// Column order shared by every sink
pub const COLUMNS: [&str; 10] = [
    "order_no",
    "type",
    "amount",
    "commission",
    "status",
    "payment_method",
    "payment_account",
    "created_at",
    "expires_at",
    "updated_at",
];

/// How the verification aggregate is appended to the script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trailer {
    /// Commented out, for a human to run by hand
    Comment,
    /// Executed as part of the script
    Statement,
    None,
}

/// Where `updated_at` comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatedAt {
    /// The generation time stored on the fixture
    Fixture,
    /// The database clock at insertion time
    Database,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOptions {
    pub table: String,
    /// Lead with a delete of every row carrying the fixtures' type tag
    pub cleanup: bool,
    pub trailer: Trailer,
    pub updated_at: UpdatedAt,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        ScriptOptions {
            table: DEFAULT_TABLE.to_owned(),
            cleanup: true,
            trailer: Trailer::Comment,
            updated_at: UpdatedAt::Fixture,
        }
    }
}

/// Renders the cleanup statement, one multi-row insert and the trailer.
///
/// # Errors
/// Errors when `fixtures` is empty or the table name is not a plain identifier
pub fn render_script(fixtures: &[OrderFixture], options: &ScriptOptions) -> Result<String, ScriptError> {
    validate_table(&options.table)?;
    if fixtures.is_empty() {
        return Err(ScriptError::Empty);
    }

    let mut script = String::new();
    if options.cleanup {
        script.push_str(&cleanup_statement(&options.table, ORDER_TYPE));
        script.push_str("\n\n");
    }

    script.push_str(&format!(
        "INSERT INTO {} ({})\nVALUES\n",
        options.table,
        COLUMNS.join(", ")
    ));
    let values: Vec<String> = fixtures
        .iter()
        .map(|fixture| values_tuple(fixture, options.updated_at))
        .collect();
    script.push_str(&values.join(",\n"));
    script.push_str(";\n");

    match options.trailer {
        Trailer::Comment => {
            script.push_str("\n-- Verify data\n-- ");
            script.push_str(&verification_query(&options.table, ORDER_TYPE));
            script.push('\n');
        }
        Trailer::Statement => {
            script.push_str("\n-- Verify data\n");
            script.push_str(&verification_query(&options.table, ORDER_TYPE));
            script.push('\n');
        }
        Trailer::None => {}
    }
    Ok(script)
}

#[must_use]
pub fn cleanup_statement(table: &str, type_tag: &str) -> String {
    format!(
        "DELETE FROM {} WHERE type = {};",
        table,
        quote_literal(type_tag)
    )
}

#[must_use]
pub fn verification_query(table: &str, type_tag: &str) -> String {
    format!(
        "SELECT status, COUNT(*) AS count, ROUND(AVG(amount), 2) AS avg_amount FROM {} WHERE type = {} GROUP BY status;",
        table,
        quote_literal(type_tag)
    )
}

fn values_tuple(fixture: &OrderFixture, updated_at: UpdatedAt) -> String {
    let updated_at = match updated_at {
        UpdatedAt::Fixture => quote_literal(&format_timestamp(fixture.updated_at)),
        UpdatedAt::Database => "CURRENT_TIMESTAMP".to_owned(),
    };
    format!(
        "  ({}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
        quote_literal(&fixture.order_no),
        quote_literal(fixture.order_type),
        fixture.amount,
        fixture.commission,
        quote_literal(fixture.status.as_str()),
        quote_literal(fixture.payment_method.as_str()),
        quote_literal(&fixture.payment_account),
        quote_literal(&format_timestamp(fixture.created_at)),
        quote_literal(&format_timestamp(fixture.expires_at)),
        updated_at,
    )
}

/// Single-quoted SQL string literal with embedded quotes doubled
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Table names are interpolated into SQL, so only `[A-Za-z_][A-Za-z0-9_]*`
/// optionally qualified by one schema name is accepted.
pub(crate) fn validate_table(table: &str) -> Result<(), ConfigurationError> {
    let is_identifier = |part: &str| {
        let mut chars = part.chars();
        chars
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|part| is_identifier(part)) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidTable(table.to_owned()))
    }
}
