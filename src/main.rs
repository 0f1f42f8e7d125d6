// Photo booth kiosk: GPIO token and button, camera capture, CUPS printing.

use clap::Parser;
use tracing::{error, info, warn};

use photobooth::board::{new_board, Board};
use photobooth::camera::new_camera;
use photobooth::cli::Cli;
use photobooth::compositor::LayoutCompositor;
use photobooth::print_monitor::{MonitorSettings, PrintJobMonitor};
use photobooth::printers::new_spooler;
use photobooth::screen::Screen;
use photobooth::storage::ensure_directory;
use photobooth::web_screen::WebScreen;
use photobooth::{AppResult, Config, SessionController, SessionSettings};

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

fn io_error(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, message)
}

/// Build every collaborator, then hand them to the session loop.
async fn run(config: Config) -> AppResult<()> {
    config.app.mode.ensure_supported()?;

    ensure_directory(&config.paths.photos)?;
    info!("Photos are stored in {:?}", config.paths.photos);

    // Fails fast on an unknown sheet format or a missing watermark
    let compositor = LayoutCompositor::from_config(&config)?;

    let mut screen = WebScreen::from_config(&config)?;
    if config.app.deferred {
        info!("Display starts with the first screen");
    } else {
        screen.ensure_initialized()?;
    }

    let camera = new_camera(&config);
    let spooler = new_spooler(&config.printer);
    let monitor = PrintJobMonitor::new(spooler, MonitorSettings::from_config(&config.printer));

    let mut board = new_board(&config.board);
    if let Err(e) = board.setup() {
        board.release();
        screen.release();
        return Err(e.into());
    }

    let mut controller = SessionController::new(
        SessionSettings::from_config(&config),
        board,
        Box::new(screen),
        camera,
        compositor,
        monitor,
    );

    controller.run().await
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config, &cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            error!("Configuration error: {}", e);
            return Err(io_error(format!("Failed to load configuration: {}", e)));
        }
    };

    let level = if config.app.mode.is_debug() {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    init_tracing(level);

    info!(
        "Starting {} version {} in {} mode",
        config.app.name, config.app.version, config.app.mode
    );
    if config.printer.use_mock {
        warn!("Printing is simulated");
    }

    if let Err(e) = run(config).await {
        error!(error_type = e.error_type(), "Photo booth stopped: {}", e);
        return Err(io_error(format!("Photo booth stopped: {}", e)));
    }

    info!("Photo booth shut down cleanly");
    Ok(())
}
