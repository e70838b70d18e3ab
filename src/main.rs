mod aggregator;
mod broadcast;
mod config;
mod controller;
mod error;
mod handlers;
mod metadata;
mod process;
mod progress;
mod scanner;
mod state;
mod status;
mod tasks;

use axum::{
    Router,
    routing::{get, post},
};
use local_ip_address::local_ip;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Level, info, warn};

use crate::config::Settings;
use crate::handlers::{api, web, ws};
use crate::process::SysinfoSource;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let settings = Settings::new().expect("Failed to load configuration");

    tracing_subscriber::fmt()
        .with_env_filter(&settings.log_level)
        .init();

    info!("Starting fleetwatch...");

    if !settings.download_dir.exists() {
        warn!(
            "Download directory {:?} does not exist yet, waiting for the job to create it",
            settings.download_dir
        );
    }

    let state = AppState::new(settings.clone(), Arc::new(SysinfoSource::new()));

    // Start the status poller
    tasks::start_background_tasks(state.clone());

    // --- Router Setup ---
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    info!("Listening on http://{}", addr);
    if let Ok(ip) = local_ip() {
        info!("Network address: http://{}:{}", ip, settings.server_port);
    }

    axum::serve(listener, app).await.expect("Server error");
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(web::index_handler))
        .route("/api/status", get(api::get_status))
        .route("/api/start", post(api::start_job))
        .route("/api/stop", post(api::stop_job))
        .route("/api/items/{id}", get(api::get_item))
        .route("/api/info", get(api::server_info))
        .route("/events", get(api::sse_handler))
        .route("/ws", get(ws::status_ws))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
        .fallback(web::not_found)
}
