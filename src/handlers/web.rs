use axum::{
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Assets;

/// The dashboard is a single self-contained page.
pub async fn index_handler() -> Response {
    match Assets::get("index.html") {
        Some(content) => ([(CONTENT_TYPE, "text/html")], content.data).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "index.html not found in embedded assets",
        )
            .into_response(),
    }
}

pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}
