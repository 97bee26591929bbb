use common::jobs::{Job, JobStatus};
use rowpipe::error::PipelineError;
use rowpipe::job_controller::registry::JobRegistry;
use rowpipe::job_controller::runner::{JobRunner, RunnerConfig};
use rowpipe::pipeline::bulk::BulkInsertSink;
use rowpipe::pipeline::generate::generate_workbook;
use rowpipe::pipeline::load::load_csv;
use rowpipe::pipeline::progress::JobProgress;
use rowpipe::pipeline::row::RowSource;
use rowpipe::pipeline::spreadsheet::SpreadsheetSource;
use rowpipe::pipeline::transform::workbook_to_csv;
use rowpipe::store::{SqliteStore, StudentFilter};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;

fn runner() -> JobRunner {
    JobRunner::new(
        JobRegistry::new(),
        RunnerConfig {
            workers: 2,
            queue_capacity: 4,
        },
        Handle::current(),
    )
}

/// Runs one stage to completion and checks the status it went through.
async fn run_stage<F>(runner: &JobRunner, stage: F) -> Job
where
    F: FnOnce(&JobProgress) -> Result<Option<String>, PipelineError> + Send + 'static,
{
    let registry = runner.registry().clone();
    let job_id = registry.create_job();
    assert_eq!(registry.get_job(&job_id).unwrap().status, JobStatus::Submitted);

    let seen = Arc::new(Mutex::new(None));
    let seen_in_stage = seen.clone();
    let observer = registry.clone();
    runner
        .submit(job_id.clone(), move |progress| {
            *seen_in_stage.lock().unwrap() =
                observer.get_job(progress.job_id()).map(|job| job.status);
            stage(&progress)
        })
        .unwrap()
        .wait()
        .await;

    assert_eq!(*seen.lock().unwrap(), Some(JobStatus::Processing));
    registry.get_job(&job_id).unwrap()
}

fn scores_by_id(workbook: &Path) -> HashMap<i64, f64> {
    let mut source = SpreadsheetSource::open(workbook).unwrap();
    source.next_row().unwrap();
    let mut scores = HashMap::new();
    while let Some(row) = source.next_row().unwrap() {
        scores.insert(row.number(0).unwrap() as i64, row.number(5).unwrap());
    }
    scores
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generated_students_reach_the_database_with_both_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let workbook = dir.path().join("StudentData.xlsx");
    let csv = dir.path().join("ProcessedData.csv");
    let database = dir.path().join("students.sqlite");
    let runner = runner();

    let output = workbook.clone();
    let generated = run_stage(&runner, move |progress| {
        generate_workbook(100, &output, progress)
    })
    .await;
    assert_eq!(generated.status, JobStatus::Completed);
    assert_eq!(generated.progress, 100);
    assert_eq!(generated.processed_count, 100);
    let original = scores_by_id(&workbook);
    assert_eq!(original.len(), 100);

    let (input, output) = (workbook.clone(), csv.clone());
    let transformed = run_stage(&runner, move |progress| {
        workbook_to_csv(&input, &output, progress)
    })
    .await;
    assert_eq!(transformed.status, JobStatus::Completed);
    assert_eq!(transformed.result, Some(csv.display().to_string()));

    let (input, db) = (csv.clone(), database.clone());
    let loaded = run_stage(&runner, move |progress| {
        let mut sink = BulkInsertSink::new(SqliteStore::open(&db)?, 7);
        load_csv(&input, &mut sink, progress)
    })
    .await;
    assert_eq!(loaded.status, JobStatus::Completed);
    assert_eq!(loaded.result.as_deref(), Some("100 rows inserted"));
    assert_eq!(loaded.processed_count, 100);

    let store = SqliteStore::open(&database).unwrap();
    assert_eq!(store.count(&StudentFilter::default()).unwrap(), 100);
    let mut checked = 0;
    store
        .for_each(&StudentFilter::default(), |record| {
            assert_eq!(record.score, original[&record.student_id] + 15.0);
            checked += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(checked, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loading_a_missing_file_fails_without_inserting() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("students.sqlite");
    let missing = dir.path().join("nowhere.csv");
    let runner = runner();

    let db = database.clone();
    let job = run_stage(&runner, move |progress| {
        let mut sink = BulkInsertSink::new(SqliteStore::open(&db)?, 10);
        load_csv(&missing, &mut sink, progress)
    })
    .await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(!job.result.unwrap_or_default().is_empty());
    assert!(job.progress < 100);
    let store = SqliteStore::open(&database).unwrap();
    assert_eq!(store.count(&StudentFilter::default()).unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_workbook_fails_the_transform() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.xlsx");
    std::fs::write(&input, b"this is not a zip archive").unwrap();
    let output = dir.path().join("out.csv");
    let runner = runner();

    let job = run_stage(&runner, move |progress| {
        workbook_to_csv(&input, &output, progress)
    })
    .await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.result.unwrap().starts_with("spreadsheet read error"));
}
