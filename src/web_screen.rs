// Kiosk display served over HTTP. The browser polls the current view and
// posts key presses back.

use actix_files as fs;
use actix_web::dev::ServerHandle;
use actix_web::{middleware, web, App, HttpServer};
use serde::Serialize;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::errors::{ConfigError, DisplayError};
use crate::routes;
use crate::screen::{Key, Screen, ScreenView};

/// Presses beyond this are dropped until the session loop reads them.
pub const MAX_PENDING_KEYS: usize = 16;

#[derive(Debug)]
pub struct ScreenState {
    pub view: ScreenView,
    pub revision: u64,
    pub pressed: VecDeque<Key>,
    pub stop: bool,
}

impl ScreenState {
    pub fn new(init_label: &str) -> Self {
        Self {
            view: ScreenView::Init {
                label: init_label.to_string(),
            },
            revision: 0,
            pressed: VecDeque::new(),
            stop: false,
        }
    }

    /// Escape is the stop request; anything else waits to be consumed.
    pub fn press(&mut self, key: Key) {
        if key == Key::Escape {
            self.stop = true;
            return;
        }
        if self.pressed.len() >= MAX_PENDING_KEYS {
            debug!(?key, "Key queue full, dropping press");
            return;
        }
        self.pressed.push_back(key);
    }

    pub fn take(&mut self, key: Key) -> bool {
        match self.pressed.iter().position(|k| *k == key) {
            Some(idx) => {
                self.pressed.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn discard(&mut self, key: Key) {
        self.pressed.retain(|k| *k != key);
    }

    pub fn set_view(&mut self, view: ScreenView) {
        self.view = view;
        self.revision += 1;
    }
}

/// Static presentation settings handed to the kiosk page.
#[derive(Debug, Clone, Serialize)]
pub struct KioskInfo {
    pub title: String,
    pub fullscreen: bool,
    pub background: [u8; 3],
    pub text: [u8; 3],
}

pub type SharedScreenState = Arc<Mutex<ScreenState>>;

pub fn lock_state(state: &Mutex<ScreenState>) -> MutexGuard<'_, ScreenState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct WebScreen {
    addr: SocketAddr,
    photos_dir: PathBuf,
    info: KioskInfo,
    state: SharedScreenState,
    server: Option<ServerHandle>,
}

impl WebScreen {
    pub fn new(addr: SocketAddr, photos_dir: PathBuf, info: KioskInfo, init_label: &str) -> Self {
        Self {
            addr,
            photos_dir,
            info,
            state: Arc::new(Mutex::new(ScreenState::new(init_label))),
            server: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let info = KioskInfo {
            title: config.title(),
            fullscreen: config.app.fullscreen,
            background: config.display.background,
            text: config.display.text,
        };
        Ok(Self::new(
            config.socket_addr()?,
            config.paths.photos.clone(),
            info,
            &config.display.labels.init,
        ))
    }

    pub fn state(&self) -> SharedScreenState {
        self.state.clone()
    }

    fn start_server(&self) -> Result<ServerHandle, DisplayError> {
        let state = web::Data::from(self.state.clone());
        let info = web::Data::new(self.info.clone());
        let photos_dir = self.photos_dir.clone();

        let server = HttpServer::new(move || {
            App::new()
                .wrap(middleware::Logger::default())
                .wrap(middleware::NormalizePath::trim())
                .app_data(state.clone())
                .app_data(info.clone())
                .configure(routes::configure)
                .service(fs::Files::new("/photos", photos_dir.clone()))
        })
        .workers(1)
        .disable_signals()
        .shutdown_timeout(1)
        .bind(self.addr)
        .map_err(|e| DisplayError::Bind {
            addr: self.addr.to_string(),
            source: e,
        })?
        .run();

        let handle = server.handle();
        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("Display server error: {}", e);
            }
        });

        // Ctrl+C and SIGTERM are treated like the stop key
        let stop_state = self.state.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            lock_state(&stop_state).stop = true;
        });

        Ok(handle)
    }
}

impl Screen for WebScreen {
    fn ensure_initialized(&mut self) -> Result<(), DisplayError> {
        if self.server.is_some() {
            return Ok(());
        }
        let handle = self.start_server()?;
        info!("Display '{}' served on http://{}", self.info.title, self.addr);
        self.server = Some(handle);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.server.is_some()
    }

    fn show(&mut self, view: ScreenView) -> Result<(), DisplayError> {
        self.ensure_initialized()?;
        debug!(?view, "Showing screen");
        lock_state(&self.state).set_view(view);
        Ok(())
    }

    fn is_pressed(&mut self, key: Key) -> Result<bool, DisplayError> {
        Ok(lock_state(&self.state).take(key))
    }

    fn discard_pressed(&mut self, key: Key) -> Result<(), DisplayError> {
        lock_state(&self.state).discard(key);
        Ok(())
    }

    fn request_to_stop(&mut self) -> Result<bool, DisplayError> {
        Ok(lock_state(&self.state).stop)
    }

    fn release(&mut self) {
        let Some(handle) = self.server.take() else {
            return;
        };
        info!("Stopping display server");
        // the stop command is sent on call; awaiting only waits for workers
        let stopping = handle.stop(false);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(stopping);
            }
            Err(_) => warn!("No runtime left to wait for the display server"),
        }
    }
}

impl Drop for WebScreen {
    fn drop(&mut self) {
        self.release();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
