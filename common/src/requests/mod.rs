use crate::model::student::StudentClass;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
/// Query string of the generation endpoint: number of rows to synthesize.
pub struct GenerateRequest {
    pub count: u64,
}

/// Query string shared by the report and export endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub student_id: Option<i64>,
    pub student_class: Option<StudentClass>,
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

/// Returned by every endpoint that schedules a background job.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreated {
    pub job_id: String,
}

/// Envelope wrapping every JSON response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}
