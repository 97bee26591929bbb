use crate::error::PipelineError;
use crate::job_controller::registry::JobRegistry;
use log::info;
use tokio_util::sync::CancellationToken;

/// A stage's view of its own job: lets it publish row counts to the registry
/// and notice when it has been asked to stop.
#[derive(Clone)]
pub struct JobProgress {
    registry: JobRegistry,
    job_id: String,
    interrupt: CancellationToken,
}

impl JobProgress {
    pub fn new(registry: JobRegistry, job_id: impl Into<String>) -> Self {
        JobProgress {
            registry,
            job_id: job_id.into(),
            interrupt: CancellationToken::new(),
        }
    }

    /// Ties the stage to `interrupt`; once it fires, [`checkpoint`](Self::checkpoint) fails.
    pub fn with_interrupt(mut self, interrupt: CancellationToken) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Publishes `processed` rows out of `total` (`0` when the total is unknown).
    pub fn report(&self, processed: u64, total: u64) {
        if total > 0 {
            info!(
                "Job {} - {}/{} rows ({}%)",
                self.job_id,
                processed,
                total,
                processed.saturating_mul(100) / total
            );
        } else {
            info!("Job {} - {} rows processed", self.job_id, processed);
        }
        self.registry.update_progress(&self.job_id, processed, total);
    }

    /// Fails with [`PipelineError::Interrupted`] once the stage has been told to stop.
    ///
    /// Stages call this at their progress cadence.
    pub fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.interrupt.is_cancelled() {
            return Err(PipelineError::Interrupted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_fails_only_after_interrupt() {
        let registry = JobRegistry::new();
        let interrupt = CancellationToken::new();
        let progress = JobProgress::new(registry.clone(), registry.create_job())
            .with_interrupt(interrupt.clone());

        assert!(progress.checkpoint().is_ok());
        interrupt.cancel();
        let err = progress.checkpoint().unwrap_err();
        assert_eq!(err.to_string(), "interrupted by shutdown");
    }
}
