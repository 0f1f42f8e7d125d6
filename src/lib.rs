// Library module organization

pub mod board;
pub mod camera;
pub mod capture;
pub mod cli;
pub mod compositor;
pub mod config;
pub mod errors;
pub mod gate;
pub mod gphoto_camera;
pub mod print_monitor;
pub mod printers;
pub mod routes;
pub mod screen;
pub mod session;
pub mod sheet;
pub mod storage;
pub mod web_screen;

// Re-export commonly used types for convenience
pub use config::{Config, RunMode};
pub use errors::{AppError, AppResult};
pub use session::{SessionController, SessionSettings, SessionState};
