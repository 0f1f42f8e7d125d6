use actix_web::{get, post, web, HttpResponse, Responder};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::screen::Key;
use crate::web_screen::{lock_state, KioskInfo, ScreenState};

#[get("/api/screen")]
pub async fn screen_state(
    state: web::Data<Mutex<ScreenState>>,
    info: web::Data<KioskInfo>,
) -> impl Responder {
    let state = lock_state(&state);
    HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "revision": state.revision,
        "stopping": state.stop,
        "kiosk": info.get_ref(),
        "view": &state.view,
    }))
}

#[post("/api/keys/{key}")]
pub async fn press_key(
    path: web::Path<String>,
    state: web::Data<Mutex<ScreenState>>,
) -> impl Responder {
    let key = match path.into_inner().parse::<Key>() {
        Ok(key) => key,
        Err(e) => {
            warn!("Ignoring key press: {}", e);
            return HttpResponse::BadRequest().json(serde_json::json!({
                "ok": false,
                "error": e
            }));
        }
    };

    lock_state(&state).press(key);
    HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "key": key
    }))
}

#[post("/api/stop")]
pub async fn request_stop(state: web::Data<Mutex<ScreenState>>) -> impl Responder {
    info!("Stop requested from the kiosk");
    lock_state(&state).stop = true;
    HttpResponse::Ok().json(serde_json::json!({ "ok": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes;
    use crate::screen::ScreenView;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn info() -> KioskInfo {
        KioskInfo {
            title: "PhotoBooth-1.0".to_string(),
            fullscreen: true,
            background: [0, 0, 0],
            text: [255, 255, 255],
        }
    }

    #[actix_web::test]
    async fn test_screen_endpoint_reports_view() {
        let state = Arc::new(Mutex::new(ScreenState::new("Starting")));
        lock_state(&state).set_view(ScreenView::Token {
            label: "Insert a token".to_string(),
        });

        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(state.clone()))
                .app_data(web::Data::new(info()))
                .configure(routes::configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/screen").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["revision"], 1);
        assert_eq!(body["view"]["screen"], "token");
        assert_eq!(body["view"]["label"], "Insert a token");
        assert_eq!(body["kiosk"]["title"], "PhotoBooth-1.0");
    }

    #[actix_web::test]
    async fn test_key_presses() {
        let state = Arc::new(Mutex::new(ScreenState::new("Starting")));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(state.clone()))
                .app_data(web::Data::new(info()))
                .configure(routes::configure),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/keys/k").to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
        assert!(lock_state(&state).take(Key::Skip));

        let req = test::TestRequest::post().uri("/api/keys/space").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::post().uri("/api/keys/escape").to_request();
        test::call_service(&app, req).await;
        assert!(lock_state(&state).stop);
    }

    #[actix_web::test]
    async fn test_stop_endpoint() {
        let state = Arc::new(Mutex::new(ScreenState::new("Starting")));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(state.clone()))
                .app_data(web::Data::new(info()))
                .configure(routes::configure),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/stop").to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
        assert!(lock_state(&state).stop);
    }

    #[actix_web::test]
    async fn test_kiosk_page() {
        let app = test::init_service(App::new().configure(routes::configure)).await;
        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
}
