// Display capability used by the session controller

use serde::Serialize;
use std::str::FromStr;

use crate::errors::DisplayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    /// Operator shortcut that satisfies the current wait in debug mode.
    Skip,
    Escape,
}

impl FromStr for Key {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "k" | "skip" => Ok(Key::Skip),
            "esc" | "escape" => Ok(Key::Escape),
            other => Err(format!("unknown key: {}", other)),
        }
    }
}

/// What the kiosk shows. Rendering is left to the display implementation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum ScreenView {
    Init { label: String },
    Token { label: String },
    Button { label: String },
    Countdown { photo: u32, total: u32, remaining: u32 },
    Pose { label: String },
    PrintPreview { label: String, image: String },
    Farewell { label: String },
}

pub trait Screen: Send {
    /// Single idempotent initialization routine. Operations that need a live
    /// display call this first.
    fn ensure_initialized(&mut self) -> Result<(), DisplayError>;

    fn is_initialized(&self) -> bool;

    fn show(&mut self, view: ScreenView) -> Result<(), DisplayError>;

    /// Consume one pending press of `key`, if any.
    fn is_pressed(&mut self, key: Key) -> Result<bool, DisplayError>;

    /// Drop every pending press of `key`.
    fn discard_pressed(&mut self, key: Key) -> Result<(), DisplayError> {
        while self.is_pressed(key)? {}
        Ok(())
    }

    fn request_to_stop(&mut self) -> Result<bool, DisplayError>;

    /// Idempotent; never fails.
    fn release(&mut self);

    /// The startup screen is only drawn when the display is already up,
    /// a deferred display stays dark until the first real screen.
    fn show_init(&mut self, label: &str) -> Result<(), DisplayError> {
        if !self.is_initialized() {
            return Ok(());
        }
        self.show(ScreenView::Init {
            label: label.to_string(),
        })
    }
}
