mod hub;
mod msg;
mod room;
mod wire;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub use hub::{Connection, Hub, Presence, Topic};
pub use msg::SqliteMessageStore;
pub use wire::{ClientFrame, RoomRef, ServerEvent, WireMessage};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversation/{teacher_id}/{student_id}", get(room::conversation))
        .route("/send", post(room::send))
        .route("/ws", get(ws::room_ws))
}
