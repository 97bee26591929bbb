use crate::error::ApiError;
use crate::pipeline::bulk::BulkInsertSink;
use crate::pipeline::load::load_csv;
use crate::services::students::{receive_file, schedule};
use crate::services::AppState;
use crate::store::SqliteStore;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};

/// Accepts a CSV file and starts loading it into the database.
pub(crate) async fn process(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let input = receive_file(payload, &state.storage, "csv").await?;
    let job_id = state.registry.create_job();
    let database = state.config.database_path.clone();
    let batch_size = state.config.batch_size;
    schedule(&state, job_id, move |progress| {
        // One connection per load job.
        let store = SqliteStore::open(&database)?;
        let mut sink = BulkInsertSink::new(store, batch_size);
        load_csv(&input, &mut sink, &progress)
    })
}
