// Route modules organization

pub mod base_routes;
pub mod screen_routes;

use actix_web::web;

pub use base_routes::*;
pub use screen_routes::*;

/// Kiosk page and its JSON API. Expects `Mutex<ScreenState>` and
/// `KioskInfo` as app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(kiosk_page)
        .service(screen_state)
        .service(press_key)
        .service(request_stop);
}
