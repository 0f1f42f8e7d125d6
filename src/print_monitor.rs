// Submits composed photos and follows the job until the spooler is done
// with it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PrinterConfig;
use crate::errors::PrinterError;
use crate::printers::{PrintJob, PrintJobState, Spooler};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    /// Bounds both the wait for queue room and the wait for completion.
    pub timeout: Duration,
    pub max_queue: usize,
    pub queue_poll_interval: Duration,
}

impl MonitorSettings {
    pub fn from_config(config: &PrinterConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_secs(config.max_wait_secs),
            max_queue: config.max_queue,
            queue_poll_interval: Duration::from_secs(config.queue_poll_interval_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintOutcome {
    Completed,
    Failed(PrintJobState),
    TimedOut,
}

impl PrintOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PrintOutcome::Completed)
    }
}

pub struct PrintJobMonitor {
    spooler: Arc<dyn Spooler>,
    settings: MonitorSettings,
}

impl PrintJobMonitor {
    pub fn new(spooler: Arc<dyn Spooler>, settings: MonitorSettings) -> Self {
        info!("Print monitor using {}", spooler.type_name());
        Self { spooler, settings }
    }

    /// Queue gate, submit, then poll. Only a failed submission is an error;
    /// everything after that is reported through the outcome.
    pub async fn print(&self, path: &Path) -> Result<PrintOutcome, PrinterError> {
        self.wait_for_queue().await;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = format!("PhotoBooth - {}", file_name);

        let id = self.spooler.submit(path, &title).await?;
        let mut job = PrintJob::new(id);
        info!(job = %job.id, "Print job submitted");

        let outcome = self.wait_for_completion(&mut job).await;
        match &outcome {
            PrintOutcome::Completed => info!(job = %job.id, "Print completed"),
            PrintOutcome::Failed(state) => warn!(job = %job.id, ?state, "Print failed"),
            PrintOutcome::TimedOut => warn!(
                job = %job.id,
                state = ?job.state,
                "Timed out waiting for print after {:?}",
                self.settings.timeout
            ),
        }
        Ok(outcome)
    }

    /// Gives up silently after the timeout, the job is submitted anyway.
    async fn wait_for_queue(&self) {
        let started = Instant::now();
        loop {
            match self.spooler.queued_jobs().await {
                Ok(queued) if queued > self.settings.max_queue => {
                    if started.elapsed() >= self.settings.timeout {
                        warn!("Timeout: queue still holds {} jobs, printing anyway", queued);
                        return;
                    }
                    info!("Queue: {} jobs, waiting...", queued);
                }
                Ok(_) => return,
                Err(e) => {
                    warn!("Can't read print queue ({}), submitting anyway", e);
                    return;
                }
            }

            let remaining = self.settings.timeout.saturating_sub(started.elapsed());
            tokio::time::sleep(self.settings.queue_poll_interval.min(remaining)).await;
        }
    }

    async fn wait_for_completion(&self, job: &mut PrintJob) -> PrintOutcome {
        let deadline = Instant::now() + self.settings.timeout;

        loop {
            match self.spooler.job_state(&job.id).await {
                Ok(Some(state)) => {
                    if state != job.state {
                        debug!(
                            job = %job.id,
                            from = ?job.state,
                            to = ?state,
                            code = state.code(),
                            "Job state changed"
                        );
                        job.state = state;
                    }
                    if state.is_terminal() {
                        return match state {
                            PrintJobState::Completed => PrintOutcome::Completed,
                            failed => PrintOutcome::Failed(failed),
                        };
                    }
                }
                Ok(None) => {
                    info!(job = %job.id, "Job no longer queued, assuming completed");
                    job.state = PrintJobState::Completed;
                    return PrintOutcome::Completed;
                }
                Err(e) => warn!(job = %job.id, "Failed to poll job state: {}", e),
            }

            let now = Instant::now();
            if now >= deadline {
                return PrintOutcome::TimedOut;
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }
}
