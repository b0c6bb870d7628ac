//! Per-user notification storage and fan-out.

mod handlers;
mod store;

use axum::{
    Router,
    routing::{get, put},
};
use sqlx::SqlitePool;

use crate::{
    AppState,
    error::ChatError,
    model::Notification,
    rooms::{Hub, ServerEvent, Topic},
};

pub use store::SqliteNotifications;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list).post(handlers::trigger))
        .route("/unread", get(handlers::unread))
        .route("/read-all", put(handlers::read_all))
        .route("/{id}/read", put(handlers::read))
}

/// Stores a notification for `owner_id`, then pushes it and the new unread
/// total to the owner's user room.
pub async fn emit(
    db_pool: &SqlitePool,
    hub: &Hub,
    owner_id: &str,
    payload: serde_json::Value,
) -> Result<Notification, ChatError> {
    let notification = store::create(db_pool, owner_id, payload).await?;
    let topic = Topic::User(owner_id.to_owned());

    hub.publish(&topic, ServerEvent::NotificationNew(notification.clone()));
    let count = publish_count(db_pool, hub, owner_id).await?;

    tracing::info!(%owner_id, id = %notification.id, unread = count, "notification emitted");
    Ok(notification)
}

/// Pushes the owner's current unread total and returns it.
pub async fn publish_count(db_pool: &SqlitePool, hub: &Hub, owner_id: &str) -> Result<u64, ChatError> {
    let count = store::unread_count(db_pool, owner_id).await?;
    hub.publish(
        &Topic::User(owner_id.to_owned()),
        ServerEvent::NotificationCount { count },
    );
    Ok(count)
}
