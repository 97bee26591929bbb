use crate::error::PipelineError;
use crate::pipeline::delimited::DelimitedSink;
use crate::pipeline::progress::JobProgress;
use crate::pipeline::row::{closing, Cell, Row, RowSink, RowSource};
use crate::pipeline::spreadsheet::SpreadsheetSource;
use log::info;
use std::path::Path;
use std::time::Instant;

/// Added to every score when a workbook is converted to CSV.
pub const SCORE_OFFSET: f64 = 10.0;

/// Rows between two progress reports.
pub const PROGRESS_INTERVAL: u64 = 10_000;

/// Returns the six canonical fields of `row` with `offset` added to the score.
///
/// Missing text cells become empty strings; a missing or non-numeric score
/// is an error. `line` is the 1-based data row number used in diagnostics.
pub fn rescore(row: &Row, offset: f64, line: u64) -> Result<Row, PipelineError> {
    let score = row
        .number(5)
        .ok_or_else(|| PipelineError::malformed(line, "score", row.text(5)))?;
    let mut cells: Vec<Cell> = (0..5)
        .map(|index| Cell::Text(row.text(index).into_owned()))
        .collect();
    cells.push(Cell::Number(score + offset));
    Ok(Row::new(cells))
}

/// Streams `source` into `sink`, replacing the header with the canonical one
/// and shifting every score by `offset`.
///
/// Both ends are closed on every path. Returns the number of data rows.
pub fn transform<Src, Snk>(
    source: &mut Src,
    sink: &mut Snk,
    offset: f64,
    progress: &JobProgress,
) -> Result<u64, PipelineError>
where
    Src: RowSource + ?Sized,
    Snk: RowSink + ?Sized,
{
    let outcome = closing(sink, |sink| {
        // Whatever header the source carries is dropped.
        source.next_row()?;
        sink.write(&Row::canonical_header())?;

        let mut processed = 0;
        while let Some(row) = source.next_row()? {
            processed += 1;
            sink.write(&rescore(&row, offset, processed)?)?;
            if processed % PROGRESS_INTERVAL == 0 {
                progress.report(processed, 0);
                progress.checkpoint()?;
            }
        }
        progress.report(processed, 0);
        Ok(processed)
    });
    let closed = source.close();
    let processed = outcome?;
    closed?;
    Ok(processed)
}

/// Converts the workbook at `input` into a CSV file at `output`.
pub fn workbook_to_csv(
    input: &Path,
    output: &Path,
    progress: &JobProgress,
) -> Result<Option<String>, PipelineError> {
    let start = Instant::now();
    info!("Job {} - Starting workbook to CSV conversion", progress.job_id());
    let mut source = SpreadsheetSource::open(input)?;
    let mut sink = DelimitedSink::create(output)?;
    let rows = transform(&mut source, &mut sink, SCORE_OFFSET, progress)?;
    info!(
        "Job {} - Workbook to CSV finished in {}ms: {} rows -> {}",
        progress.job_id(),
        start.elapsed().as_millis(),
        rows,
        output.display()
    );
    Ok(Some(output.display().to_string()))
}
