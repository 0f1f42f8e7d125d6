use actix_web::{get, HttpResponse, Responder};

// Embed HTML files at compile time
const KIOSK_HTML: &str = include_str!("../../html/kiosk.html");

#[get("/")]
pub async fn kiosk_page() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/html")
        .body(KIOSK_HTML)
}
