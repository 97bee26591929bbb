use crate::error::ApiError;
use crate::pipeline::transform::workbook_to_csv;
use crate::services::students::{receive_file, schedule};
use crate::services::AppState;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};

/// Accepts a workbook and starts converting it to CSV.
pub(crate) async fn process(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let input = receive_file(payload, &state.storage, "xlsx").await?;
    let job_id = state.registry.create_job();
    let output = state
        .storage
        .path_for(&format!("ProcessedData_{}.csv", job_id));
    schedule(&state, job_id, move |progress| {
        workbook_to_csv(&input, &output, &progress)
    })
}
