use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(feature = "printer-cups")]
use printers::{
    common::base::job::{PrinterJobOptions, PrinterJobState},
    common::base::printer::Printer as PrintersCratePrinter,
    get_printers,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::PrinterConfig;
use crate::errors::PrinterError;

/// Job states as numbered by the spooler (IPP `job-state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum PrintJobState {
    Pending = 3,
    PendingHeld = 4,
    Processing = 5,
    ProcessingStopped = 6,
    Canceled = 7,
    Aborted = 8,
    Completed = 9,
}

impl PrintJobState {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// No further transition will ever be reported for this job.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PrintJobState::Completed | PrintJobState::Canceled | PrintJobState::Aborted
        )
    }
}

/// Opaque spooler handle for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrintJob {
    pub id: JobId,
    pub state: PrintJobState,
    pub submitted_at: DateTime<Utc>,
}

impl PrintJob {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            state: PrintJobState::Pending,
            submitted_at: Utc::now(),
        }
    }
}

/// Platform print spooler. The booth only appends jobs and reads their
/// state, it never cancels anything.
#[async_trait]
pub trait Spooler: Send + Sync {
    async fn submit(&self, path: &Path, title: &str) -> Result<JobId, PrinterError>;

    /// `None` once the spooler no longer knows the job.
    async fn job_state(&self, id: &JobId) -> Result<Option<PrintJobState>, PrinterError>;

    /// Jobs currently waiting or printing.
    async fn queued_jobs(&self) -> Result<usize, PrinterError>;

    fn type_name(&self) -> &'static str;
}

// CUPS spooler backed by the printers crate
#[cfg(feature = "printer-cups")]
pub struct CupsSpooler {
    printer: PrintersCratePrinter,
}

#[cfg(feature = "printer-cups")]
impl CupsSpooler {
    /// Use the named printer, or the first one CUPS reports.
    pub fn new(printer_name: Option<&str>) -> Result<Self, PrinterError> {
        let printers = get_printers();

        info!("Available printers:");
        for printer in &printers {
            info!(
                "  - Name: '{}', System Name: '{}', URI: '{}'",
                printer.name, printer.system_name, printer.uri
            );
        }

        let selected = match printer_name {
            Some(name) => printers
                .iter()
                .find(|p| p.name == name || p.system_name == name)
                .cloned(),
            None => printers.first().cloned(),
        };

        match selected {
            Some(printer) => {
                info!(
                    "Selected printer: '{}' (System: '{}')",
                    printer.name, printer.system_name
                );
                Ok(Self { printer })
            }
            None => Err(PrinterError::NotFound {
                name: printer_name.unwrap_or("<any>").to_string(),
            }),
        }
    }

    /// Only the title is set, every other option keeps the crate default.
    fn job_options(title: &str) -> PrinterJobOptions<'_> {
        PrinterJobOptions {
            name: Some(title),
            ..PrinterJobOptions::none()
        }
    }

    fn map_state(state: &PrinterJobState) -> PrintJobState {
        match state {
            PrinterJobState::PENDING => PrintJobState::Pending,
            PrinterJobState::PAUSED => PrintJobState::PendingHeld,
            PrinterJobState::PROCESSING => PrintJobState::Processing,
            PrinterJobState::CANCELLED => PrintJobState::Canceled,
            PrinterJobState::COMPLETED => PrintJobState::Completed,
            // the crate has no separate aborted state; unknown jobs keep polling
            _ => PrintJobState::Processing,
        }
    }
}

#[cfg(feature = "printer-cups")]
#[async_trait]
impl Spooler for CupsSpooler {
    async fn submit(&self, path: &Path, title: &str) -> Result<JobId, PrinterError> {
        if !path.is_file() {
            return Err(PrinterError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )));
        }

        let path_str = path.to_string_lossy();

        // Accepted by CUPS does not mean printed, the monitor polls for that
        match self.printer.print_file(&path_str, Self::job_options(title)) {
            Ok(job_id) => {
                info!("Print job submitted with ID: {}", job_id);
                Ok(JobId(job_id.to_string()))
            }
            Err(e) => {
                warn!("Print job failed: {:?}", e);
                Err(PrinterError::SubmitFailed(format!("CUPS print error: {:?}", e)))
            }
        }
    }

    async fn job_state(&self, id: &JobId) -> Result<Option<PrintJobState>, PrinterError> {
        let state = self
            .printer
            .get_active_jobs()
            .into_iter()
            .chain(self.printer.get_job_history())
            .find(|job| job.id.to_string() == id.0)
            .map(|job| Self::map_state(&job.state));
        Ok(state)
    }

    async fn queued_jobs(&self) -> Result<usize, PrinterError> {
        Ok(self.printer.get_active_jobs().len())
    }

    fn type_name(&self) -> &'static str {
        "CUPS"
    }
}

/// Spooler used when no printer is available. Jobs complete after a fixed
/// delay.
pub struct MockSpooler {
    delay: Duration,
    jobs: Mutex<HashMap<JobId, tokio::time::Instant>>,
    counter: Mutex<u64>,
}

impl MockSpooler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jobs: Mutex::new(HashMap::new()),
            counter: Mutex::new(0),
        }
    }
}

impl Default for MockSpooler {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[async_trait]
impl Spooler for MockSpooler {
    async fn submit(&self, path: &Path, title: &str) -> Result<JobId, PrinterError> {
        let mut counter = self
            .counter
            .lock()
            .map_err(|_| PrinterError::NotReady {
                reason: "mock spooler poisoned".to_string(),
            })?;
        *counter += 1;
        let id = JobId(format!("mock-job-{}", *counter));
        info!("Mock printing {:?} as '{}' ({})", path, title, id);

        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(id.clone(), tokio::time::Instant::now());
        }
        Ok(id)
    }

    async fn job_state(&self, id: &JobId) -> Result<Option<PrintJobState>, PrinterError> {
        let jobs = self.jobs.lock().map_err(|_| PrinterError::NotReady {
            reason: "mock spooler poisoned".to_string(),
        })?;
        Ok(jobs.get(id).map(|submitted| {
            if submitted.elapsed() >= self.delay {
                PrintJobState::Completed
            } else {
                PrintJobState::Processing
            }
        }))
    }

    async fn queued_jobs(&self) -> Result<usize, PrinterError> {
        let jobs = self.jobs.lock().map_err(|_| PrinterError::NotReady {
            reason: "mock spooler poisoned".to_string(),
        })?;
        Ok(jobs.values().filter(|t| t.elapsed() < self.delay).count())
    }

    fn type_name(&self) -> &'static str {
        "Mock Spooler"
    }
}

/// Pick the spooler for this host once, at startup.
#[cfg(feature = "printer-cups")]
pub fn new_spooler(config: &PrinterConfig) -> Arc<dyn Spooler> {
    if config.use_mock {
        info!("Mock printer requested by configuration");
        return Arc::new(MockSpooler::default());
    }

    match CupsSpooler::new(config.name.as_deref()) {
        Ok(spooler) => Arc::new(spooler),
        Err(e) => {
            warn!("Printer initialization failed (non-critical): {}", e);
            warn!("No physical printer found, using mock printer");
            Arc::new(MockSpooler::default())
        }
    }
}

#[cfg(not(feature = "printer-cups"))]
pub fn new_spooler(_config: &PrinterConfig) -> Arc<dyn Spooler> {
    // Without CUPS support there is nothing else to talk to
    Arc::new(MockSpooler::default())
}
