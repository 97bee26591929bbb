use crate::error::PipelineError;
use crate::pipeline::bulk::{BulkInsert, BulkInsertSink};
use crate::pipeline::delimited::DelimitedSource;
use crate::pipeline::progress::JobProgress;
use crate::pipeline::row::{RowSink, RowSource};
use crate::pipeline::transform::rescore;
use log::info;
use std::path::Path;
use std::time::Instant;

/// Added to every score when a CSV file is loaded into the database.
pub const SCORE_OFFSET: f64 = 5.0;

/// Streams the data rows of `source` into `sink` with `offset` added to
/// every score. The leading row of the source is treated as a header.
///
/// Progress is published after every flushed batch. The tail batch is only
/// flushed when every row went through; after a failure, rows still buffered
/// are dropped and the failed batch is not retried. Returns the number of
/// rows stored.
pub fn load<Src, S>(
    source: &mut Src,
    sink: &mut BulkInsertSink<S>,
    offset: f64,
    progress: &JobProgress,
) -> Result<u64, PipelineError>
where
    Src: RowSource + ?Sized,
    S: BulkInsert,
{
    let streamed = stream_rows(source, sink, offset, progress);
    let closed = source.close();
    if let Err(err) = streamed.and(closed) {
        sink.discard();
        return Err(err);
    }
    sink.close()?;
    progress.report(sink.inserted(), 0);
    Ok(sink.inserted())
}

fn stream_rows<Src, S>(
    source: &mut Src,
    sink: &mut BulkInsertSink<S>,
    offset: f64,
    progress: &JobProgress,
) -> Result<(), PipelineError>
where
    Src: RowSource + ?Sized,
    S: BulkInsert,
{
    source.next_row()?;
    let mut line = 0;
    let mut reported = 0;
    while let Some(row) = source.next_row()? {
        line += 1;
        sink.write(&rescore(&row, offset, line)?)?;
        if sink.inserted() != reported {
            reported = sink.inserted();
            progress.report(reported, 0);
            progress.checkpoint()?;
        }
    }
    Ok(())
}

/// Loads the CSV file at `path` through `sink`.
///
/// The file is opened before anything is inserted, so a missing file fails
/// the job without touching the store.
pub fn load_csv<S: BulkInsert>(
    path: &Path,
    sink: &mut BulkInsertSink<S>,
    progress: &JobProgress,
) -> Result<Option<String>, PipelineError> {
    let start = Instant::now();
    info!("Job {} - Starting CSV load from {}", progress.job_id(), path.display());
    let mut source = DelimitedSource::open(path)?;
    let inserted = load(&mut source, sink, SCORE_OFFSET, progress)?;
    info!(
        "Job {} - CSV load finished in {}ms: {} rows in {} batches",
        progress.job_id(),
        start.elapsed().as_millis(),
        inserted,
        sink.flushes()
    );
    Ok(Some(format!("{} rows inserted", inserted)))
}
