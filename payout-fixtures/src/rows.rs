//! Row-by-row persistence: one insert per fixture, committed in batches.
//!
//! A failing row only rolls back its own unit of work. It is logged, recorded
//! in the [`InsertReport`] and skipped, and the remaining rows still go in.
//! Failing to open or commit a batch is different and aborts the run.

use log::{info, warn};

use crate::error::{ConfigurationError, PersistenceError, PersistenceRowError};
use crate::order::OrderFixture;
use crate::verify::OrderFilter;

/// A destination that accepts fixtures one at a time.
pub trait RowStore {
    /// # Errors
    /// Errors when a new unit of commit cannot be opened
    fn begin_batch(&mut self) -> Result<(), PersistenceError>;

    /// Inserts one fixture. On error the store must have undone whatever this
    /// row wrote, leaving the open batch usable.
    ///
    /// # Errors
    /// Errors when the row is rejected (constraint violation, transport error)
    fn insert_row(&mut self, fixture: &OrderFixture) -> Result<(), PersistenceError>;

    /// # Errors
    /// Errors when the open batch cannot be committed
    fn commit_batch(&mut self) -> Result<(), PersistenceError>;
}

/// Removes previously persisted fixtures. Running it repeatedly is safe.
pub trait Cleanup {
    /// Deletes every row selected by `filter`, returning how many went.
    ///
    /// # Errors
    /// Errors when the delete itself fails
    fn delete_matching(&mut self, filter: &OrderFilter) -> Result<usize, PersistenceError>;

    /// Deletes every row whose type is `type_tag`, whatever its order number.
    ///
    /// # Errors
    /// Errors when the delete itself fails
    fn delete_by_type(&mut self, type_tag: &str) -> Result<usize, PersistenceError> {
        self.delete_matching(&OrderFilter {
            type_tag: type_tag.to_owned(),
            order_no_prefix: None,
        })
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InsertReport {
    pub requested: usize,
    pub inserted: usize,
    pub failures: Vec<PersistenceRowError>,
}

impl InsertReport {
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Inserts `fixtures` one by one, committing every `batch_size` rows.
///
/// # Errors
/// Errors when `batch_size` is zero or a batch cannot be opened or committed.
/// Individual row failures are not errors, see [`InsertReport::failures`]
pub fn insert_rows<S: RowStore + ?Sized>(
    store: &mut S,
    fixtures: &[OrderFixture],
    batch_size: usize,
) -> Result<InsertReport, PersistenceError> {
    if batch_size == 0 {
        return Err(ConfigurationError::InvalidBatchSize.into());
    }

    let mut report = InsertReport {
        requested: fixtures.len(),
        ..InsertReport::default()
    };
    for (chunk_index, chunk) in fixtures.chunks(batch_size).enumerate() {
        let start = chunk_index * batch_size;
        store
            .begin_batch()
            .map_err(|e| batch_error("open", start, &e))?;
        for (offset, fixture) in chunk.iter().enumerate() {
            match store.insert_row(fixture) {
                Ok(()) => report.inserted += 1,
                Err(e) => {
                    let failure = PersistenceRowError {
                        index: start + offset,
                        order_no: fixture.order_no().to_owned(),
                        cause: e.to_string(),
                    };
                    warn!("{}", failure);
                    report.failures.push(failure);
                }
            }
        }
        store
            .commit_batch()
            .map_err(|e| batch_error("commit", start, &e))?;
        info!(
            "Committed rows {}..{} ({} inserted so far)",
            start,
            start + chunk.len(),
            report.inserted
        );
    }
    Ok(report)
}

fn batch_error(action: &'static str, start: usize, error: &PersistenceError) -> PersistenceError {
    PersistenceError::Batch {
        action,
        start,
        cause: error.to_string(),
    }
}
