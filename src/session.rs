// The booth workflow: token, confirm, capture, compose, print, repeat.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::board::Board;
use crate::camera::Camera;
use crate::capture::{CaptureBuffer, CapturedFrame, PushOutcome};
use crate::compositor::LayoutCompositor;
use crate::config::{Config, LabelsConfig};
use crate::errors::AppResult;
use crate::gate::InputGate;
use crate::print_monitor::{PrintJobMonitor, PrintOutcome};
use crate::screen::{Screen, ScreenView};
use crate::storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    AwaitingToken,
    AwaitingConfirm,
    Capturing,
    Composing,
    Printing,
}

impl SessionState {
    /// Forward steps of the workflow, plus the abort path from any working
    /// state back to the token screen.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (AwaitingToken, AwaitingConfirm)
                | (AwaitingConfirm, Capturing)
                | (Capturing, Composing)
                | (Composing, Printing)
                | (Printing, AwaitingToken)
                | (Capturing, AwaitingToken)
                | (Composing, AwaitingToken)
        )
    }
}

/// Everything the loop needs from the configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub photo_count: u32,
    pub countdown: u32,
    pub buffer_capacity: usize,
    pub photos_dir: PathBuf,
    pub prefix: String,
    pub extension: String,
    pub token_module: String,
    pub confirm_module: String,
    pub labels: LabelsConfig,
    /// Enables the keyboard override at every gate.
    pub debug: bool,
    pub idle: Duration,
    pub farewell: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            photo_count: config.photo.count,
            countdown: config.photo.countdown,
            buffer_capacity: config.photo.queue_size,
            photos_dir: config.paths.photos.clone(),
            prefix: config.photo.prefix.clone(),
            extension: config.photo.extension.clone(),
            token_module: config.board.token_module.clone(),
            confirm_module: config.board.confirm_module.clone(),
            labels: config.display.labels.clone(),
            debug: config.app.mode.is_debug(),
            idle: Duration::from_millis(config.session.idle_poll_ms),
            farewell: Duration::from_secs(config.session.farewell_secs),
        }
    }
}

/// Owns the board and the display for the whole process and releases both
/// exactly once, whichever way the loop ends.
pub struct SessionController {
    board: Box<dyn Board>,
    screen: Box<dyn Screen>,
    camera: Box<dyn Camera>,
    buffer: CaptureBuffer,
    compositor: LayoutCompositor,
    monitor: PrintJobMonitor,
    settings: SessionSettings,
    state: SessionState,
    completed: u64,
    torn_down: bool,
}

impl SessionController {
    pub fn new(
        settings: SessionSettings,
        board: Box<dyn Board>,
        screen: Box<dyn Screen>,
        camera: Box<dyn Camera>,
        compositor: LayoutCompositor,
        monitor: PrintJobMonitor,
    ) -> Self {
        Self {
            board,
            screen,
            camera,
            buffer: CaptureBuffer::new(settings.buffer_capacity),
            compositor,
            monitor,
            settings,
            state: SessionState::AwaitingToken,
            completed: 0,
            torn_down: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Sessions that reached the print step.
    pub fn completed_sessions(&self) -> u64 {
        self.completed
    }

    /// Run until a stop request is seen at one of the gates, then tear down.
    /// Errors that are not session-local end the loop and are returned after
    /// teardown.
    pub async fn run(&mut self) -> AppResult<()> {
        let result = self.run_loop().await;
        if let Err(e) = &result {
            warn!(error_type = e.error_type(), "Session loop failed: {}", e);
        }
        self.teardown();
        result
    }

    /// Release the board and the display. Only the first call does anything.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        info!("Releasing board and display");
        self.board.release();
        self.screen.release();
    }

    async fn run_loop(&mut self) -> AppResult<()> {
        self.screen.show_init(&self.settings.labels.init)?;
        info!(camera = %self.camera.name(), "Booth ready");

        loop {
            let discarded = self.buffer.clear();
            if discarded > 0 {
                warn!("Discarded {} frames left by an aborted session", discarded);
            }

            self.show(ScreenView::Token {
                label: self.settings.labels.token.clone(),
            })?;
            let token = self.settings.token_module.clone();
            if !self.wait_module(&token).await? {
                break;
            }
            self.transition(SessionState::AwaitingConfirm);

            self.show(ScreenView::Button {
                label: self.settings.labels.button.clone(),
            })?;
            let confirm = self.settings.confirm_module.clone();
            if !self.wait_module(&confirm).await? {
                break;
            }

            let span = info_span!("session", id = %Uuid::new_v4());
            let outcome = self.run_session().instrument(span).await;
            match outcome {
                Ok(()) => self.completed += 1,
                Err(e) if e.is_session_local() => {
                    warn!(error_type = e.error_type(), "Session aborted: {}", e);
                    self.transition(SessionState::AwaitingToken);
                }
                Err(e) => return Err(e),
            }
        }

        info!("Stop requested, leaving the session loop");
        Ok(())
    }

    async fn run_session(&mut self) -> AppResult<()> {
        info!("Session started");
        self.transition(SessionState::Capturing);
        self.capture_photos().await?;

        self.transition(SessionState::Composing);
        let frames = self.drain_buffer();
        debug!("Composing {} frames", frames.len());
        let composed = self.compositor.compose_frames(frames)?;
        let path = storage::save_image(
            &composed,
            &self.settings.photos_dir,
            &self.settings.prefix,
            &self.settings.extension,
        )?;

        self.transition(SessionState::Printing);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.show(ScreenView::PrintPreview {
            label: self.settings.labels.printing.clone(),
            image: format!("/photos/{}", file_name),
        })?;

        // printing is best effort, the booth moves on whatever happens
        match self.monitor.print(&path).await {
            Ok(PrintOutcome::Completed) => info!("Photo printed"),
            Ok(outcome) => warn!(?outcome, "Photo was not printed"),
            Err(e) => warn!("Printing failed: {}", e),
        }

        self.show(ScreenView::Farewell {
            label: self.settings.labels.farewell.clone(),
        })?;
        tokio::time::sleep(self.settings.farewell).await;

        self.transition(SessionState::AwaitingToken);
        info!("Session finished");
        Ok(())
    }

    async fn capture_photos(&mut self) -> AppResult<()> {
        let total = self.settings.photo_count;

        for photo in 1..=total {
            for remaining in (1..=self.settings.countdown).rev() {
                self.show(ScreenView::Countdown {
                    photo,
                    total,
                    remaining,
                })?;
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            self.show(ScreenView::Pose {
                label: self.settings.labels.pose.clone(),
            })?;

            let image = self.camera.take_pic().await?;
            match self.buffer.push(CapturedFrame::new(photo, image)) {
                PushOutcome::Queued { .. } => info!(photo, total, "Photo taken"),
                PushOutcome::Dropped => warn!(photo, total, "Photo taken but dropped"),
            }
        }
        Ok(())
    }

    fn drain_buffer(&mut self) -> Vec<CapturedFrame> {
        let mut frames = Vec::with_capacity(self.buffer.len());
        while !self.buffer.is_empty() {
            if let Some(frame) = self.buffer.pop() {
                frames.push(frame);
            }
        }
        frames
    }

    async fn wait_module(&mut self, name: &str) -> AppResult<bool> {
        let mut gate = InputGate::new(
            self.board.as_ref(),
            self.screen.as_mut(),
            self.settings.debug,
            self.settings.idle,
        );
        gate.wait_module(name).await
    }

    fn show(&mut self, view: ScreenView) -> AppResult<()> {
        self.screen.show(view)?;
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}
