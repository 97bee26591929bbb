use crate::error::ApiError;
use crate::pipeline::generate::generate_workbook;
use crate::services::students::schedule;
use crate::services::AppState;
use actix_web::{web, HttpResponse};
use common::requests::GenerateRequest;

/// Data rows that fit in one worksheet below the header row.
const MAX_ROWS: u64 = 1_048_575;

pub(crate) async fn process(
    state: web::Data<AppState>,
    query: web::Query<GenerateRequest>,
) -> Result<HttpResponse, ApiError> {
    let count = query.count;
    if count == 0 {
        return Err(ApiError::BadRequest("count must be greater than 0".to_string()));
    }
    if count > MAX_ROWS {
        return Err(ApiError::BadRequest(format!(
            "count must not exceed {} rows",
            MAX_ROWS
        )));
    }

    let job_id = state.registry.create_job();
    let output = state
        .storage
        .path_for(&format!("StudentData_{}.xlsx", job_id));
    schedule(&state, job_id, move |progress| {
        generate_workbook(count, &output, &progress)
    })
}
