pub mod config;
pub mod error;
pub mod message;
pub mod rooms;
pub mod store;

use std::sync::Arc;

use axum::{Router, extract::FromRef, routing::get};
use tower_http::cors::CorsLayer;

use rooms::Relay;

pub use config::Config;
pub use error::{RelayError, RelayResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

pub fn app(app_state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .merge(rooms::router())
        .with_state(app_state)
        .layer(cors)
}
