use crate::error::PipelineError;
use crate::pipeline::progress::JobProgress;
use crate::pipeline::row::{closing, Row, RowSink, RowSource};
use crate::pipeline::spreadsheet::{SpreadsheetSink, DEFAULT_SHEET_NAME};
use crate::pipeline::synthetic::SyntheticSource;
use log::info;
use std::path::Path;
use std::time::Instant;

/// Rows between two progress reports.
pub const PROGRESS_INTERVAL: u64 = 10_000;

/// Writes the canonical header and every row of `source` into `sink`, then
/// closes the sink. Returns the number of data rows written.
pub fn generate<S>(
    source: &mut SyntheticSource,
    sink: &mut S,
    progress: &JobProgress,
) -> Result<u64, PipelineError>
where
    S: RowSink + ?Sized,
{
    let total = source.count();
    closing(sink, |sink| {
        sink.write(&Row::canonical_header())?;
        let mut written = 0;
        while let Some(row) = source.next_row()? {
            sink.write(&row)?;
            written += 1;
            if written % PROGRESS_INTERVAL == 0 {
                progress.report(written, total);
                progress.checkpoint()?;
            }
        }
        progress.report(written, total);
        Ok(written)
    })
}

/// Generates `count` students into a new workbook at `output`.
///
/// Returns the output path, which becomes the job result.
pub fn generate_workbook(
    count: u64,
    output: &Path,
    progress: &JobProgress,
) -> Result<Option<String>, PipelineError> {
    let start = Instant::now();
    info!(
        "Job {} - Starting workbook generation: {} records",
        progress.job_id(),
        count
    );
    let mut sink = SpreadsheetSink::create(output, DEFAULT_SHEET_NAME)?;
    let written = generate(&mut SyntheticSource::new(count), &mut sink, progress)?;
    info!(
        "Job {} - Workbook generation finished in {}ms: {} rows -> {}",
        progress.job_id(),
        start.elapsed().as_millis(),
        written,
        output.display()
    );
    Ok(Some(output.display().to_string()))
}
