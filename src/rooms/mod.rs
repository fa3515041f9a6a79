pub mod broadcast;
pub mod protocol;
pub mod reconcile;
pub mod registry;
pub mod relay;
pub mod session;
mod ws;

use axum::{Router, routing::get};

use crate::AppState;

pub use broadcast::Broadcaster;
pub use registry::{ConnectionId, RoomRegistry};
pub use relay::Relay;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws::room_ws))
}
