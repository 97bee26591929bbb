use crate::error::ApiError;
use crate::services::AppState;
use actix_web::{web, HttpResponse};
use common::requests::ApiResponse;

pub(crate) async fn process(
    job_id: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let job_id = job_id.into_inner();
    match state.registry.get_job(&job_id) {
        Some(job) => Ok(HttpResponse::Ok().json(ApiResponse::success("Job status", job))),
        None => Err(ApiError::NotFound(format!("Job ID not found: {}", job_id))),
    }
}
