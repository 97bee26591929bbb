//! The streaming unit shared by every stage and the traits that move it.
//!
//! Stages are written once against [`RowSource`] and [`RowSink`] and never
//! see whether rows come from a workbook, a CSV file, a random generator or
//! end up in the database. Implementations keep at most a small, fixed number
//! of rows in memory, which is what keeps a whole job inside a constant
//! memory ceiling regardless of the size of the dataset.

use crate::error::PipelineError;
use common::model::student::{StudentRecord, CANONICAL_HEADER};
use std::borrow::Cow;
use std::fmt;

/// A single cell value.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(text) => f.write_str(text),
            // f64's Display prints 71.0 as "71" and 71.5 as "71.5".
            Cell::Number(number) => write!(f, "{}", number),
        }
    }
}

impl From<&str> for Cell {
    fn from(text: &str) -> Self {
        Cell::Text(text.to_string())
    }
}

impl From<String> for Cell {
    fn from(text: String) -> Self {
        Cell::Text(text)
    }
}

impl From<f64> for Cell {
    fn from(number: f64) -> Self {
        Cell::Number(number)
    }
}

/// An ordered tuple of cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    cells: Vec<Cell>,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Row { cells }
    }

    /// The fixed header every textual output starts with.
    pub fn canonical_header() -> Self {
        Row::new(CANONICAL_HEADER.iter().map(|&title| Cell::from(title)).collect())
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Textual value of a cell; missing and empty cells read as `""`.
    pub fn text(&self, index: usize) -> Cow<'_, str> {
        match self.cells.get(index) {
            Some(Cell::Text(text)) => Cow::Borrowed(text.trim()),
            Some(Cell::Number(number)) => Cow::Owned(number.to_string()),
            Some(Cell::Empty) | None => Cow::Borrowed(""),
        }
    }

    /// Numeric value of a cell, parsing text when needed.
    pub fn number(&self, index: usize) -> Option<f64> {
        match self.cells.get(index) {
            Some(Cell::Number(number)) => Some(*number),
            Some(Cell::Text(text)) => text.trim().parse().ok(),
            Some(Cell::Empty) | None => None,
        }
    }
}

impl From<&StudentRecord> for Row {
    fn from(record: &StudentRecord) -> Self {
        Row::new(vec![
            Cell::Number(record.student_id as f64),
            Cell::Text(record.first_name.clone()),
            Cell::Text(record.last_name.clone()),
            Cell::Text(record.date_of_birth.format("%Y-%m-%d").to_string()),
            Cell::Text(record.class.to_string()),
            Cell::Number(record.score),
        ])
    }
}

/// A lazy, finite, single-pass sequence of rows.
pub trait RowSource {
    /// Returns the next row, or `None` once the stream is exhausted.
    fn next_row(&mut self) -> Result<Option<Row>, PipelineError>;

    /// Releases the underlying handle. Safe to call more than once and after
    /// a failed read.
    fn close(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Destination of a row stream.
pub trait RowSink {
    fn write(&mut self, row: &Row) -> Result<(), PipelineError>;

    /// Flushes whatever is still buffered and releases the destination.
    /// Calling it again after success is a no-op.
    fn close(&mut self) -> Result<(), PipelineError>;
}

/// Runs `body`, then closes `sink` whether or not `body` succeeded.
/// The first error wins.
pub(crate) fn closing<S, T>(
    sink: &mut S,
    body: impl FnOnce(&mut S) -> Result<T, PipelineError>,
) -> Result<T, PipelineError>
where
    S: RowSink + ?Sized,
{
    let outcome = body(sink);
    let closed = sink.close();
    let value = outcome?;
    closed?;
    Ok(value)
}
