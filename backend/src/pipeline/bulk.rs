use crate::error::PipelineError;
use crate::pipeline::row::{Row, RowSink};
use chrono::NaiveDate;
use common::model::student::{StudentClass, StudentRecord};

/// A backing store that accepts a whole batch in one call.
///
/// An implementation must apply the batch atomically: either every row of
/// the call is stored or the call fails.
pub trait BulkInsert {
    fn insert_batch(&mut self, rows: &[StudentRecord]) -> Result<(), PipelineError>;
}

/// Parses canonical rows into records and hands them to the store in
/// batches of at most `capacity`.
pub struct BulkInsertSink<S: BulkInsert> {
    store: S,
    batch: Vec<StudentRecord>,
    capacity: usize,
    rows_seen: u64,
    inserted: u64,
    flushes: u64,
}

impl<S: BulkInsert> BulkInsertSink<S> {
    pub fn new(store: S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        BulkInsertSink {
            store,
            batch: Vec::with_capacity(capacity),
            capacity,
            rows_seen: 0,
            inserted: 0,
            flushes: 0,
        }
    }

    /// Rows already handed to the store.
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Drops buffered rows without handing them to the store.
    pub fn discard(&mut self) {
        self.batch.clear();
    }

    /// Hands the buffered rows to the store once. A failed batch is dropped,
    /// never sent again.
    fn flush(&mut self) -> Result<(), PipelineError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let outcome = self.store.insert_batch(&self.batch);
        if outcome.is_ok() {
            self.inserted += self.batch.len() as u64;
            self.flushes += 1;
        }
        self.batch.clear();
        outcome
    }
}

impl<S: BulkInsert> RowSink for BulkInsertSink<S> {
    fn write(&mut self, row: &Row) -> Result<(), PipelineError> {
        self.rows_seen += 1;
        let record = parse_record(row, self.rows_seen)?;
        self.batch.push(record);
        if self.batch.len() >= self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        self.flush()
    }
}

/// Turns a canonical row into a typed record; `line` is used in diagnostics.
pub fn parse_record(row: &Row, line: u64) -> Result<StudentRecord, PipelineError> {
    let id = row.text(0);
    let student_id = id
        .parse::<i64>()
        .or_else(|_| match row.number(0) {
            Some(number) if number.fract() == 0.0 => Ok(number as i64),
            _ => Err(()),
        })
        .map_err(|_| PipelineError::malformed(line, "id", &*id))?;

    let dob = row.text(3);
    let date_of_birth = NaiveDate::parse_from_str(&dob, "%Y-%m-%d")
        .map_err(|_| PipelineError::malformed(line, "date of birth", &*dob))?;

    let label = row.text(4);
    let class = label
        .parse::<StudentClass>()
        .map_err(|_| PipelineError::malformed(line, "class", &*label))?;

    let score = row
        .number(5)
        .ok_or_else(|| PipelineError::malformed(line, "score", row.text(5)))?;

    Ok(StudentRecord {
        student_id,
        first_name: row.text(1).into_owned(),
        last_name: row.text(2).into_owned(),
        date_of_birth,
        class,
        score,
    })
}
