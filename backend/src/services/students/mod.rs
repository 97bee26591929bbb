//! Student pipeline endpoints.
//!
//! Each stage is started by its own route and runs in the background; the
//! caller gets a `jobId` back right away and polls `/status/{job_id}`.
//!
//! - `POST /api/students/generate?count=N`: synthesize `N` students into a workbook.
//! - `POST /api/students/process`: multipart `file` (.xlsx), converted to CSV with score + 10.
//! - `POST /api/students/upload`: multipart `file` (.csv), loaded into the database with score + 5.
//! - `GET /api/students/status/{job_id}`: current snapshot of a job.
//! - `GET /api/students/count`, `/report`, `/report/export/{csv,excel}`: queries over loaded rows.

use crate::error::{ApiError, PipelineError};
use crate::pipeline::progress::JobProgress;
use crate::services::AppState;
use crate::storage::FileStorage;
use actix_multipart::Multipart;
use actix_web::web::{get, post, scope};
use actix_web::{HttpResponse, Scope};
use common::jobs::JobStatus;
use common::requests::{ApiResponse, JobCreated};
use futures_util::StreamExt;
use log::warn;
use std::path::PathBuf;

mod generate;
mod get_status;
mod process;
mod report;
mod upload;

const API_PATH: &str = "/api/students";

pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/generate", post().to(generate::process))
        .route("/process", post().to(process::process))
        .route("/upload", post().to(upload::process))
        .route("/status/{job_id}", get().to(get_status::process))
        .route("/count", get().to(report::count))
        .route("/report", get().to(report::page))
        .route("/report/export/csv", get().to(report::export_csv))
        .route("/report/export/excel", get().to(report::export_excel))
}

/// Hands `stage` to the runner for the already registered `job_id`.
///
/// A refused submission fails the job so pollers never see it stuck in
/// SUBMITTED.
fn schedule<F>(state: &AppState, job_id: String, stage: F) -> Result<HttpResponse, ApiError>
where
    F: FnOnce(JobProgress) -> Result<Option<String>, PipelineError> + Send + 'static,
{
    match state.runner.submit(job_id.clone(), stage) {
        Ok(_) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            "Job submitted",
            JobCreated { job_id },
        ))),
        Err(err) => {
            warn!("Job {} - rejected: {}", job_id, err);
            state
                .registry
                .update_status(&job_id, JobStatus::Failed, Some(err.to_string()));
            Err(err.into())
        }
    }
}

/// Stores the multipart `file` field, which must carry the given extension.
async fn receive_file(
    mut payload: Multipart,
    storage: &FileStorage,
    extension: &str,
) -> Result<PathBuf, ApiError> {
    while let Some(item) = payload.next().await {
        let field = item.map_err(|e| ApiError::Upload(e.to_string()))?;
        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name().map(|n| n.to_string()));
        if name.as_deref() != Some("file") {
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename().map(|f| f.to_ascii_lowercase()))
            .unwrap_or_default();
        if !filename.ends_with(&format!(".{}", extension)) {
            return Err(ApiError::BadRequest(format!(
                "The file must end with .{}",
                extension
            )));
        }
        return storage.save_upload(field, extension).await;
    }
    Err(ApiError::BadRequest("Missing file".to_string()))
}
