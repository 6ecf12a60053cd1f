use std::io;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::order::OrderStatus;

/// Invalid generator or collaborator configuration. Always raised before any
/// fixture is generated or any row is written.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Record count must be at least 1")]
    InvalidCount,
    #[error("Amount range must be positive with min < max, got {min}..{max}")]
    InvalidAmountRange { min: Decimal, max: Decimal },
    #[error("Commission rate range must lie within [0, 1] with min < max, got {min}..{max}")]
    InvalidRateRange { min: f64, max: f64 },
    #[error("Status weights do not cover `{0}`")]
    MissingStatusWeight(OrderStatus),
    #[error("Status weight for `{status}` must be finite and non-negative, got {weight}")]
    InvalidStatusWeight { status: OrderStatus, weight: f64 },
    #[error("Status weights sum to zero")]
    ZeroStatusWeights,
    #[error("Status weights sum to a non-finite value")]
    StatusWeightsOverflow,
    #[error("Payment method set is empty")]
    NoPaymentMethods,
    #[error("Payment method `{0}` has no account template")]
    UnknownPaymentMethod(String),
    #[error("Order number width {width} cannot hold sequence index {max_index}")]
    PadWidthTooSmall { width: usize, max_index: usize },
    #[error("Order number width {width} exceeds the maximum of {max}")]
    PadWidthTooLarge { width: usize, max: usize },
    #[error("Lookback of {days} days exceeds the maximum of {max}")]
    InvalidLookback { days: u32, max: u32 },
    #[error("Expiry offset must be at least one minute")]
    InvalidExpiry,
    #[error("Timestamps derived from {0} fall outside the representable range")]
    TimestampOutOfRange(chrono::DateTime<chrono::Utc>),
    #[error("Commit batch size must be at least 1")]
    InvalidBatchSize,
    #[error("`{0}` is not a valid table name")]
    InvalidTable(String),
    #[error("API key contains characters that cannot be sent in a header")]
    InvalidApiKey,
    #[error("Either a database path or a REST endpoint must be given")]
    MissingTarget,
    #[error("A REST endpoint needs an API key")]
    MissingApiKey,
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Cannot render an insert statement for zero fixtures")]
    Empty,
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// A single row that could not be persisted in row-by-row mode. Recorded and
/// skipped, never fatal to the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Row {index} ({order_no}) was skipped: {cause}")]
pub struct PersistenceRowError {
    pub index: usize,
    pub order_no: String,
    pub cause: String,
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Batch-script mode is all-or-nothing: nothing from the script was kept.
    #[error("SQL script failed and was rolled back: {0}")]
    Script(#[source] rusqlite::Error),
    #[error("Could not {action} the batch starting at row {start}: {cause}")]
    Batch {
        action: &'static str,
        start: usize,
        cause: String,
    },
    #[error("Request rejected with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("SQLite Error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("HTTP Error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[derive(Error, Debug)]
pub enum VerificationQueryError {
    #[error("HTTP Error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Query rejected with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("SQLite Error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Malformed record: {0}")]
    Malformed(String),
}

/// Top level error for the command line front end.
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Verification(#[from] VerificationQueryError),
    #[error("CSV Error")]
    CsvError(#[from] csv::Error),
    #[error("JSON Error")]
    JsonError(#[from] serde_json::Error),
    #[error("I/O Error")]
    IoError(#[from] io::Error),
}
