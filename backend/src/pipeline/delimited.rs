//! Comma-separated text, one line per row.
//!
//! The header is not treated specially: it is simply the first row read or
//! written, so stages decide what to do with it.

use crate::error::PipelineError;
use crate::pipeline::row::{Cell, Row, RowSink, RowSource};
use csv::{ReaderBuilder, StringRecordsIntoIter, Terminator, Trim, Writer, WriterBuilder};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub struct DelimitedSource<R: Read> {
    records: Option<StringRecordsIntoIter<R>>,
}

impl DelimitedSource<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let file = File::open(path)?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> DelimitedSource<R> {
    pub fn from_reader(reader: R) -> Self {
        let records = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader)
            .into_records();
        DelimitedSource {
            records: Some(records),
        }
    }
}

impl<R: Read> RowSource for DelimitedSource<R> {
    fn next_row(&mut self) -> Result<Option<Row>, PipelineError> {
        let Some(records) = self.records.as_mut() else {
            return Ok(None);
        };
        match records.next() {
            Some(record) => {
                let record = record?;
                let cells = record
                    .iter()
                    .map(|field| {
                        if field.is_empty() {
                            Cell::Empty
                        } else {
                            Cell::from(field)
                        }
                    })
                    .collect();
                Ok(Some(Row::new(cells)))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        self.records = None;
        Ok(())
    }
}

pub struct DelimitedSink<W: Write> {
    writer: Option<Writer<W>>,
}

impl DelimitedSink<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let file = File::create(path)?;
        Ok(Self::from_writer(file))
    }
}

impl<W: Write> DelimitedSink<W> {
    pub fn from_writer(writer: W) -> Self {
        DelimitedSink {
            writer: Some(
                WriterBuilder::new()
                    .flexible(true)
                    .terminator(Terminator::Any(b'\n'))
                    .from_writer(writer),
            ),
        }
    }

    /// Flushes and hands back the destination.
    pub fn into_inner(mut self) -> Result<W, PipelineError> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| PipelineError::Io(std::io::Error::other("sink already closed")))?;
        writer.into_inner().map_err(|err| {
            PipelineError::Io(std::io::Error::new(err.error().kind(), err.to_string()))
        })
    }
}

impl<W: Write> RowSink for DelimitedSink<W> {
    fn write(&mut self, row: &Row) -> Result<(), PipelineError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| PipelineError::Io(std::io::Error::other("sink already closed")))?;
        writer.write_record(row.cells().iter().map(Cell::to_string))?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}
