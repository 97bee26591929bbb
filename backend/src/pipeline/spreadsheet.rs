//! Streaming access to `.xlsx` workbooks.
//!
//! Neither side ever holds a full sheet in memory. The writer runs
//! `rust_xlsxwriter` in constant-memory mode, where each finished row is
//! flushed to a temporary file. The reader walks the sheet XML cell by cell
//! with `calamine` on a dedicated thread and hands complete rows over a
//! bounded blocking channel, so at most [`ROW_CACHE_SIZE`] rows are buffered ahead of
//! the consuming stage. Reading blocks the calling thread but never needs
//! an async runtime.

use crate::error::PipelineError;
use crate::pipeline::row::{Cell, Row, RowSink, RowSource};
use calamine::{open_workbook, DataRef, Reader, Xlsx};
use log::debug;
use rust_xlsxwriter::Workbook;
use std::fs::File;
use std::io::BufReader;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

/// Rows read ahead of the consumer.
pub const ROW_CACHE_SIZE: usize = 100;

pub const DEFAULT_SHEET_NAME: &str = "Students";

type RowMessage = Result<Row, PipelineError>;

pub struct SpreadsheetSource {
    rows: Option<Receiver<RowMessage>>,
    reader: Option<JoinHandle<()>>,
}

impl SpreadsheetSource {
    /// Opens the workbook and starts streaming its first worksheet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let workbook: Xlsx<BufReader<File>> = open_workbook(path.as_ref())?;
        let (tx, rx) = mpsc::sync_channel(ROW_CACHE_SIZE);
        let reader = thread::Builder::new()
            .name("xlsx-reader".to_string())
            .spawn(move || stream_first_sheet(workbook, tx))?;
        Ok(SpreadsheetSource {
            rows: Some(rx),
            reader: Some(reader),
        })
    }
}

impl RowSource for SpreadsheetSource {
    fn next_row(&mut self) -> Result<Option<Row>, PipelineError> {
        let Some(rows) = self.rows.as_ref() else {
            return Ok(None);
        };
        match rows.recv() {
            Ok(Ok(row)) => Ok(Some(row)),
            Ok(Err(err)) => Err(err),
            // The reader hung up after its last row.
            Err(_) => Ok(None),
        }
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        // Dropping the receiver makes the reader's next send fail, which stops it.
        self.rows = None;
        if let Some(reader) = self.reader.take() {
            reader.join().map_err(|_| PipelineError::ReaderGone)?;
        }
        Ok(())
    }
}

impl Drop for SpreadsheetSource {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn stream_first_sheet(mut workbook: Xlsx<BufReader<File>>, tx: SyncSender<RowMessage>) {
    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        let _ = tx.send(Err(PipelineError::EmptyWorkbook));
        return;
    };
    let mut cells = match workbook.worksheet_cells_reader(&sheet) {
        Ok(cells) => cells,
        Err(err) => {
            let _ = tx.send(Err(err.into()));
            return;
        }
    };

    let mut current_row: Option<u32> = None;
    let mut row: Vec<Cell> = Vec::new();
    loop {
        match cells.next_cell() {
            Ok(Some(cell)) => {
                let (row_index, column) = cell.get_position();
                if current_row != Some(row_index) {
                    if current_row.is_some()
                        && tx.send(Ok(Row::new(mem::take(&mut row)))).is_err()
                    {
                        debug!("xlsx reader stopped: consumer closed");
                        return;
                    }
                    current_row = Some(row_index);
                }
                let column = column as usize;
                if row.len() <= column {
                    row.resize(column + 1, Cell::Empty);
                }
                row[column] = cell_value(cell.get_value());
            }
            Ok(None) => break,
            Err(err) => {
                let _ = tx.send(Err(err.into()));
                return;
            }
        }
    }
    if current_row.is_some() {
        let _ = tx.send(Ok(Row::new(row)));
    }
}

fn cell_value(value: &DataRef<'_>) -> Cell {
    match value {
        DataRef::Int(int) => Cell::Number(*int as f64),
        DataRef::Float(float) => Cell::Number(*float),
        DataRef::String(text) => Cell::Text(text.clone()),
        DataRef::SharedString(text) => Cell::Text((*text).to_string()),
        DataRef::Bool(flag) => Cell::Text(flag.to_string()),
        DataRef::DateTimeIso(text) | DataRef::DurationIso(text) => Cell::Text(text.clone()),
        // Error cells and native Excel dates carry no text the stages can use.
        _ => Cell::Empty,
    }
}

pub struct SpreadsheetSink {
    workbook: Workbook,
    path: PathBuf,
    next_row: u32,
    closed: bool,
}

impl SpreadsheetSink {
    /// Prepares a single-sheet workbook that is written to `path` on close.
    pub fn create(path: impl Into<PathBuf>, sheet_name: &str) -> Result<Self, PipelineError> {
        let mut workbook = Workbook::new();
        workbook
            .add_worksheet_with_constant_memory()
            .set_name(sheet_name)?;
        Ok(SpreadsheetSink {
            workbook,
            path: path.into(),
            next_row: 0,
            closed: false,
        })
    }
}

impl RowSink for SpreadsheetSink {
    fn write(&mut self, row: &Row) -> Result<(), PipelineError> {
        let sheet = self.workbook.worksheet_from_index(0)?;
        for (column, cell) in row.cells().iter().enumerate() {
            let column = column as u16;
            match cell {
                Cell::Number(number) => {
                    sheet.write_number(self.next_row, column, *number)?;
                }
                Cell::Text(text) => {
                    sheet.write_string(self.next_row, column, text)?;
                }
                Cell::Empty => {}
            }
        }
        self.next_row += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        if !self.closed {
            self.closed = true;
            self.workbook.save(&self.path)?;
        }
        Ok(())
    }
}
