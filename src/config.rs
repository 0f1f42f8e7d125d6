use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::board::{Direction, Pull};
use crate::errors::AppError;
pub use crate::errors::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "photobooth.toml";

/// How the booth runs. The threaded variants exist in configuration files
/// but are rejected before the session loop starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum RunMode {
    Normal = 1,
    Debug = 2,
    Threaded = 3,
    ThreadedDebug = 4,
}

impl RunMode {
    pub fn is_debug(self) -> bool {
        matches!(self, RunMode::Debug | RunMode::ThreadedDebug)
    }

    pub fn is_threaded(self) -> bool {
        matches!(self, RunMode::Threaded | RunMode::ThreadedDebug)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn ensure_supported(self) -> Result<(), AppError> {
        if self.is_threaded() {
            return Err(AppError::UnsupportedMode(self));
        }
        Ok(())
    }
}

impl TryFrom<u8> for RunMode {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RunMode::Normal),
            2 => Ok(RunMode::Debug),
            3 => Ok(RunMode::Threaded),
            4 => Ok(RunMode::ThreadedDebug),
            other => Err(ConfigError::InvalidMode(other)),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunMode::Normal => "normal",
            RunMode::Debug => "debug",
            RunMode::Threaded => "threaded",
            RunMode::ThreadedDebug => "threaded_debug",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub logging: LoggingConfig,
    pub camera: CameraConfig,
    pub photo: PhotoConfig,
    pub printer: PrinterConfig,
    pub paths: PathsConfig,
    pub display: DisplayConfig,
    pub board: BoardConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub mode: RunMode,
    pub fullscreen: bool,
    pub deferred: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "PhotoBooth".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: RunMode::Normal,
            fullscreen: true,
            deferred: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    V4l,
    Gphoto,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub backend: CameraBackend,
    pub default: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: CameraBackend::V4l,
            default: 0,
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhotoConfig {
    pub count: u32,
    pub countdown: u32,
    pub queue_size: usize,
    pub prefix: String,
    pub extension: String,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            count: 3,
            countdown: 3,
            queue_size: 3,
            prefix: "photo_".to_string(),
            extension: "png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    pub name: Option<String>,
    pub use_mock: bool,
    pub sheet_format: String,
    pub dpi: f64,
    /// Top, right, bottom, left, in centimeters.
    pub sheet_margins: [f64; 4],
    pub pics_spacing: f64,
    pub pics_per_row: u32,
    pub canvas_color: [u8; 3],
    pub max_queue: usize,
    pub max_wait_secs: u64,
    pub poll_interval_ms: u64,
    pub queue_poll_interval_secs: u64,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            name: None,
            use_mock: false,
            sheet_format: "A6".to_string(),
            dpi: 300.0,
            sheet_margins: [0.5, 0.5, 0.5, 0.5],
            pics_spacing: 0.3,
            pics_per_row: 2,
            canvas_color: [255, 255, 255],
            max_queue: 3,
            max_wait_secs: 60,
            poll_interval_ms: 1000,
            queue_poll_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub photos: PathBuf,
    pub watermark: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            photos: PathBuf::from("photos"),
            watermark: PathBuf::from("images/template/template.png"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub bind: String,
    pub background: [u8; 3],
    pub text: [u8; 3],
    pub labels: LabelsConfig,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            background: [0, 0, 0],
            text: [255, 255, 255],
            labels: LabelsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LabelsConfig {
    pub init: String,
    pub token: String,
    pub button: String,
    pub pose: String,
    pub printing: String,
    pub farewell: String,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            init: "Starting up...".to_string(),
            token: "Insert a token".to_string(),
            button: "Press the button".to_string(),
            pose: "Strike a pose!".to_string(),
            printing: "Printing...".to_string(),
            farewell: "Thank you!".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardDriver {
    Sysfs,
    Virtual,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PinConfig {
    pub pin: u32,
    pub direction: Direction,
    #[serde(default = "default_pull")]
    pub pull: Pull,
}

fn default_pull() -> Pull {
    Pull::Off
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub driver: BoardDriver,
    pub sysfs_root: PathBuf,
    pub token_module: String,
    pub confirm_module: String,
    pub pins: BTreeMap<String, PinConfig>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        let mut pins = BTreeMap::new();
        pins.insert(
            "microswitch".to_string(),
            PinConfig {
                pin: 24,
                direction: Direction::Input,
                pull: Pull::Up,
            },
        );
        pins.insert(
            "button".to_string(),
            PinConfig {
                pin: 25,
                direction: Direction::Input,
                pull: Pull::Up,
            },
        );
        Self {
            driver: BoardDriver::Sysfs,
            sysfs_root: PathBuf::from("/sys/class/gpio"),
            token_module: "microswitch".to_string(),
            confirm_module: "button".to_string(),
            pins,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_poll_ms: u64,
    pub farewell_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: 10,
            farewell_secs: 3,
        }
    }
}

/// Values taken from the command line. Each one falls back to the
/// configuration file when absent.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub name: Option<String>,
    pub mode: Option<u8>,
    pub fullscreen: bool,
    pub deferred: bool,
    pub camera: Option<u32>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_toml(&contents, path)
    }

    pub fn from_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load, apply environment and command-line overrides, then validate.
    pub fn load(path: &Path, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_with(|key| std::env::var(key).ok());
        config.apply_overrides(overrides)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("PHOTOBOOTH_BIND") {
            self.display.bind = bind;
        }
        if let Some(dir) = lookup("PHOTOBOOTH_PHOTOS_DIR") {
            self.paths.photos = PathBuf::from(dir);
        }
        if let Some(mock) = lookup("USE_MOCK_PRINTER") {
            self.printer.use_mock = mock.parse().unwrap_or(false);
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<(), ConfigError> {
        if let Some(name) = &overrides.name {
            self.app.name = name.clone();
        }
        if let Some(mode) = overrides.mode {
            self.app.mode = RunMode::try_from(mode)?;
        }
        if overrides.fullscreen {
            self.app.fullscreen = true;
        }
        if overrides.deferred {
            self.app.deferred = true;
        }
        if let Some(camera) = overrides.camera {
            self.camera.default = camera;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.photo.count == 0 {
            return Err(ConfigError::Invalid {
                key: "photo.count",
                reason: "at least one photo is required".to_string(),
            });
        }

        if self.photo.queue_size < self.photo.count as usize {
            return Err(ConfigError::Invalid {
                key: "photo.queue_size",
                reason: format!(
                    "queue of {} cannot hold {} photos",
                    self.photo.queue_size, self.photo.count
                ),
            });
        }

        if !(self.printer.dpi > 0.0) {
            return Err(ConfigError::Invalid {
                key: "printer.dpi",
                reason: "must be positive".to_string(),
            });
        }

        if self.printer.sheet_margins.iter().any(|m| *m < 0.0) || self.printer.pics_spacing < 0.0 {
            return Err(ConfigError::Invalid {
                key: "printer.sheet_margins",
                reason: "margins and spacing cannot be negative".to_string(),
            });
        }

        if self.display.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid {
                key: "display.bind",
                reason: format!("{} is not a socket address", self.display.bind),
            });
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.display
            .bind
            .parse()
            .map_err(|_| ConfigError::Invalid {
                key: "display.bind",
                reason: format!("{} is not a socket address", self.display.bind),
            })
    }

    pub fn title(&self) -> String {
        format!("{}-{}", self.app.name, self.app.version)
    }
}
