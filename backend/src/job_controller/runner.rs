//! Bounded execution of pipeline stages.
//!
//! A job goes through two gates. Admission holds `workers + queue_capacity`
//! permits and is taken without waiting, so a submission that would
//! overflow the queue is refused on the spot. Execution holds `workers`
//! permits; an admitted job waits for one, moves to PROCESSING and runs its
//! stage on the blocking thread pool. Whatever the stage does, including
//! panicking, the job is finalized exactly once by the task that ran it.
//!
//! Running stages are never killed. When shutdown's grace period runs out
//! they are interrupted instead: their next [`JobProgress::checkpoint`] fails.

use crate::error::{PipelineError, RunnerError};
use crate::job_controller::registry::JobRegistry;
use crate::pipeline::progress::JobProgress;
use common::jobs::JobStatus;
use log::{debug, error, info, warn};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Result message stored on jobs that never got a worker before shutdown.
pub const ABANDONED: &str = "abandoned at shutdown";

#[derive(Clone, Copy, Debug)]
pub struct RunnerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            workers: 4,
            queue_capacity: 100,
        }
    }
}

#[derive(Clone)]
pub struct JobRunner {
    registry: JobRegistry,
    admission: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    shutdown: CancellationToken,
    interrupt: CancellationToken,
    tracker: TaskTracker,
    handle: Handle,
}

/// Returned by [`JobRunner::submit`]; dropping it does not affect the job.
pub struct JobHandle {
    job_id: String,
    task: JoinHandle<()>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Waits until the job has reached a terminal status.
    pub async fn wait(self) {
        if let Err(err) = self.task.await {
            error!("Job {} - runner task lost: {}", self.job_id, err);
        }
    }
}

impl JobRunner {
    pub fn new(registry: JobRegistry, config: RunnerConfig, handle: Handle) -> Self {
        let workers = config.workers.max(1);
        JobRunner {
            registry,
            admission: Arc::new(Semaphore::new(workers + config.queue_capacity)),
            workers: Arc::new(Semaphore::new(workers)),
            shutdown: CancellationToken::new(),
            interrupt: CancellationToken::new(),
            tracker: TaskTracker::new(),
            handle,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Schedules `stage` for the already registered job `job_id`.
    ///
    /// Fails immediately when the queue is full or shutdown has begun; the
    /// job's status is left untouched in that case.
    pub fn submit<F>(&self, job_id: impl Into<String>, stage: F) -> Result<JobHandle, RunnerError>
    where
        F: FnOnce(JobProgress) -> Result<Option<String>, PipelineError> + Send + 'static,
    {
        let admitted = match self.admission.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Err(RunnerError::QueueFull),
            Err(TryAcquireError::Closed) => return Err(RunnerError::ShuttingDown),
        };
        let job_id = job_id.into();
        debug!("Job {} - queued", job_id);

        let registry = self.registry.clone();
        let workers = self.workers.clone();
        let shutdown = self.shutdown.clone();
        let interrupt = self.interrupt.clone();
        let id = job_id.clone();
        let task = self.tracker.spawn_on(
            async move {
                let _admitted = admitted;
                let permit = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => None,
                    permit = workers.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    warn!("Job {} - {}", id, ABANDONED);
                    registry.update_status(&id, JobStatus::Failed, Some(ABANDONED.to_string()));
                    return;
                };

                registry.update_status(&id, JobStatus::Processing, None);
                info!("Job {} - started", id);
                let start = Instant::now();
                let progress =
                    JobProgress::new(registry.clone(), id.clone()).with_interrupt(interrupt);
                let outcome = tokio::task::spawn_blocking(move || stage(progress)).await;
                finalize(&registry, &id, outcome, start);
            },
            &self.handle,
        );

        Ok(JobHandle { job_id, task })
    }

    /// Stops accepting work, fails every job still waiting for a worker and
    /// waits up to `grace` for running stages.
    ///
    /// Stages still running after `grace` are interrupted and `false` is
    /// returned without waiting for them.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.admission.close();
        self.shutdown.cancel();
        self.tracker.close();
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("Job runner stopped");
                true
            }
            Err(_) => {
                warn!(
                    "Job runner stopped after {:?}, interrupting {} running job(s)",
                    grace,
                    self.tracker.len()
                );
                self.interrupt.cancel();
                false
            }
        }
    }
}

fn finalize(
    registry: &JobRegistry,
    job_id: &str,
    outcome: Result<Result<Option<String>, PipelineError>, JoinError>,
    start: Instant,
) {
    let elapsed = start.elapsed().as_millis();
    match outcome {
        Ok(Ok(result)) => {
            info!("Job {} - completed in {}ms", job_id, elapsed);
            registry.update_status(job_id, JobStatus::Completed, result);
        }
        Ok(Err(err)) => {
            error!("Job {} - failed after {}ms: {}", job_id, elapsed, err);
            registry.update_status(job_id, JobStatus::Failed, Some(err.to_string()));
        }
        Err(err) => {
            let message = if err.is_panic() {
                format!("stage panicked: {}", panic_message(err.into_panic()))
            } else {
                format!("stage did not finish: {}", err)
            };
            error!("Job {} - {}", job_id, message);
            registry.update_status(job_id, JobStatus::Failed, Some(message));
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}
