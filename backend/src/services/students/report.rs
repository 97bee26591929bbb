//! Read-only queries over loaded students: count, paged report and exports.
//!
//! SQLite access is blocking, so every query runs under `web::block` on its
//! own connection.

use crate::error::{ApiError, PipelineError};
use crate::pipeline::delimited::DelimitedSink;
use crate::pipeline::row::{Row, RowSink};
use crate::pipeline::spreadsheet::{SpreadsheetSink, DEFAULT_SHEET_NAME};
use crate::services::AppState;
use crate::store::{PageRequest, SqliteStore, StudentFilter};
use actix_web::{web, HttpResponse};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::model::report::ExportResponse;
use common::requests::{ApiResponse, ReportRequest};
use log::info;
use serde_json::json;
use std::fs;
use std::path::PathBuf;

const CSV_CONTENT_TYPE: &str = "text/csv";
const EXCEL_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

fn filter_of(query: &ReportRequest) -> StudentFilter {
    StudentFilter {
        student_id: query.student_id,
        class: query.student_class,
    }
}

async fn with_store<T, F>(database: PathBuf, query: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&SqliteStore) -> Result<T, PipelineError> + Send + 'static,
{
    let value = web::block(move || {
        let store = SqliteStore::open(&database)?;
        query(&store)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(value)
}

pub(crate) async fn count(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let total = with_store(state.config.database_path.clone(), |store| {
        store.count(&StudentFilter::default())
    })
    .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(
        "Student count",
        json!({ "total": total }),
    )))
}

pub(crate) async fn page(
    state: web::Data<AppState>,
    query: web::Query<ReportRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = PageRequest::new(
        query.page,
        query.size,
        query.sort_by.as_deref(),
        query.sort_dir.as_deref(),
    )
    .map_err(ApiError::BadRequest)?;
    let filter = filter_of(&query);
    let page = with_store(state.config.database_path.clone(), move |store| {
        store.find_page(&filter, &request)
    })
    .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success("Student report", page)))
}

pub(crate) async fn export_csv(
    state: web::Data<AppState>,
    query: web::Query<ReportRequest>,
) -> Result<HttpResponse, ApiError> {
    let filter = filter_of(&query);
    let bytes = with_store(state.config.database_path.clone(), move |store| {
        let mut sink = DelimitedSink::from_writer(Vec::new());
        sink.write(&Row::canonical_header())?;
        store.for_each(&filter, |record| sink.write(&Row::from(&record)))?;
        sink.into_inner()
    })
    .await?;
    Ok(exported("students_report.csv", CSV_CONTENT_TYPE, &bytes))
}

pub(crate) async fn export_excel(
    state: web::Data<AppState>,
    query: web::Query<ReportRequest>,
) -> Result<HttpResponse, ApiError> {
    let filter = filter_of(&query);
    let scratch = state.storage.base_dir().to_path_buf();
    let bytes = with_store(state.config.database_path.clone(), move |store| {
        let file = tempfile::Builder::new()
            .prefix("report_")
            .suffix(".xlsx")
            .tempfile_in(&scratch)?;
        let mut sink = SpreadsheetSink::create(file.path(), DEFAULT_SHEET_NAME)?;
        sink.write(&Row::canonical_header())?;
        store.for_each(&filter, |record| sink.write(&Row::from(&record)))?;
        sink.close()?;
        Ok(fs::read(file.path())?)
    })
    .await?;
    Ok(exported("students_report.xlsx", EXCEL_CONTENT_TYPE, &bytes))
}

fn exported(file_name: &str, content_type: &str, bytes: &[u8]) -> HttpResponse {
    info!("Exported {} ({} bytes)", file_name, bytes.len());
    HttpResponse::Ok().json(ApiResponse::success(
        "Report exported",
        ExportResponse {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            data: STANDARD.encode(bytes),
        },
    ))
}
