use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::RunMode;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unsupported mode: {0} is not implemented")]
    UnsupportedMode(RunMode),

    #[error("Board error: {0}")]
    Board(#[from] BoardError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Sheet format error: {0}")]
    SheetFormat(#[from] SheetFormatError),

    #[error("Composition error: {0}")]
    Compose(#[from] ComposeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Printer error: {0}")]
    Printer(#[from] PrinterError),

    #[error("Display error: {0}")]
    Display(#[from] DisplayError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read config file {path}: {source}")]
    FileRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid mode value: {0}")]
    InvalidMode(u8),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Invalid module name: {0}")]
    ModuleNotFound(String),

    #[error("Unexpected pin value {value:?} on pin {pin}")]
    InvalidValue { pin: u32, value: String },

    #[error("GPIO I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Camera {0} not found")]
    InvalidIndex(u32),

    #[error("Camera not ready: {0}")]
    NotReady(String),

    #[error("Can't take photo: {0}")]
    CannotTakePicture(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Camera I/O error: {0}")]
    IoError(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum SheetFormatError {
    #[error("Invalid sheet format: {0}")]
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Nothing to compose: no images provided")]
    NoImages,

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Failed to load watermark {path}: {message}")]
    WatermarkLoad { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed { path: PathBuf, source: io::Error },

    #[error("Failed to save image {path}: {message}")]
    ImageSaveError { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("Printer not found: {name}")]
    NotFound { name: String },

    #[error("Printer not ready: {reason}")]
    NotReady { reason: String },

    #[error("Print job submission failed: {0}")]
    SubmitFailed(String),

    #[error("Printer I/O error: {0}")]
    IoError(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("Failed to bind display server on {addr}: {source}")]
    Bind { addr: String, source: io::Error },
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Errors that only spoil the running session. The controller logs
    /// them and goes back to waiting for a token.
    pub fn is_session_local(&self) -> bool {
        match self {
            AppError::Camera(_) => true,
            AppError::Printer(_) => true,
            AppError::Storage(_) => true,
            AppError::Compose(ComposeError::NoImages) => true,
            AppError::Compose(ComposeError::InvalidDimensions(_)) => true,
            AppError::Compose(ComposeError::WatermarkLoad { .. }) => false,
            AppError::Config(_)
            | AppError::UnsupportedMode(_)
            | AppError::Board(_)
            | AppError::SheetFormat(_)
            | AppError::Display(_) => false,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::UnsupportedMode(_) => "unsupported_mode",
            AppError::Board(_) => "board_error",
            AppError::Camera(_) => "camera_error",
            AppError::SheetFormat(_) => "sheet_format_error",
            AppError::Compose(_) => "compose_error",
            AppError::Storage(_) => "storage_error",
            AppError::Printer(_) => "printer_error",
            AppError::Display(_) => "display_error",
        }
    }
}
