//! Process-wide table of background jobs.
//!
//! `JobRegistry` is created once in `main.rs` and cloned into the HTTP layer
//! and the job runner. It is the single source of truth for status polling
//! (`GET /api/students/status/{job_id}`).
//!
//! The outer map is only locked to look up or insert an entry. Every mutation
//! of a job happens under that job's own mutex, so stages updating different
//! jobs never wait on each other, and a poller always sees status, result and
//! counters from the same update.

use common::jobs::{Job, JobStatus};
use log::warn;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use uuid::Uuid;

type Entry = Arc<Mutex<Job>>;

/// Thread-safe, cheaply clonable handle to the job table.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, Entry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh job in the SUBMITTED state and returns its id.
    pub fn create_job(&self) -> String {
        let job_id = Uuid::new_v4().to_string();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.clone(), Arc::new(Mutex::new(Job::submitted())));
        job_id
    }

    /// Returns a copy of the job, or `None` if the id was never registered.
    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.entry(job_id).map(|entry| lock(&entry).clone())
    }

    /// Replaces status and result of a job.
    ///
    /// Completing a job forces its progress to 100. An unknown id is
    /// registered on the fly. Jobs that already reached COMPLETED or FAILED
    /// are left untouched and `false` is returned.
    pub fn update_status(&self, job_id: &str, status: JobStatus, result: Option<String>) -> bool {
        let entry = match self.entry(job_id) {
            Some(entry) => entry,
            None => {
                let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
                // Re-check under the write lock: another writer may have won.
                match jobs.get(job_id) {
                    Some(entry) => entry.clone(),
                    None => {
                        let job = Job::with_status(status, result);
                        jobs.insert(job_id.to_string(), Arc::new(Mutex::new(job)));
                        return true;
                    }
                }
            }
        };
        let mut job = lock(&entry);
        apply_status(job_id, &mut job, status, result)
    }

    /// Records how many rows a job has processed so far.
    ///
    /// `total_count == 0` means the total is unknown; progress then keeps its
    /// previous value. Unknown ids and finished jobs are ignored.
    pub fn update_progress(&self, job_id: &str, processed_count: u64, total_count: u64) {
        let Some(entry) = self.entry(job_id) else {
            return;
        };
        let mut job = lock(&entry);
        if job.status.is_terminal() {
            return;
        }
        job.processed_count = job.processed_count.max(processed_count);
        job.total_count = total_count;
        if total_count > 0 {
            let percent = job.processed_count.saturating_mul(100) / total_count;
            // 100 is reserved for COMPLETED.
            job.progress = percent.min(99) as u8;
        }
    }

    /// Number of jobs ever registered; finished jobs are kept.
    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn entry(&self, job_id: &str) -> Option<Entry> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
    }
}

fn lock(entry: &Entry) -> MutexGuard<'_, Job> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

fn apply_status(job_id: &str, job: &mut Job, status: JobStatus, result: Option<String>) -> bool {
    if job.status.is_terminal() {
        warn!(
            "Job {} - ignoring {:?} update, job already {:?}",
            job_id, status, job.status
        );
        return false;
    }
    job.status = status;
    job.result = result;
    if status == JobStatus::Completed {
        job.progress = 100;
    }
    true
}
