use serde::{Deserialize, Serialize};

/// Lifecycle of a background job.
///
/// `Submitted -> Processing -> {Completed | Failed}`; the last two are absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Point-in-time view of a job as returned to pollers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub status: JobStatus,
    /// Output location on success, diagnostic message on failure.
    pub result: Option<String>,
    /// Percentage in `0..=100`; `100` only once the job is completed.
    pub progress: u8,
    pub processed_count: u64,
    /// `0` while the total is unknown (streaming sources).
    pub total_count: u64,
}

impl Job {
    pub fn submitted() -> Self {
        Self::with_status(JobStatus::Submitted, None)
    }

    pub fn with_status(status: JobStatus, result: Option<String>) -> Self {
        Job {
            status,
            result,
            progress: if status == JobStatus::Completed { 100 } else { 0 },
            processed_count: 0,
            total_count: 0,
        }
    }
}
