use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    AppResult, AppState, Config,
    error::ChatError,
    model::{Identity, Notification, UnreadCount},
    rooms::Hub,
};

use super::store;

pub(crate) const TRIGGER_TOKEN_HEADER: &str = "x-trigger-token";

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    limit: Option<u32>,
    skip: Option<u32>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    Query(ListQuery { limit, skip }): Query<ListQuery>,
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    identity: Identity,
) -> AppResult<Json<Vec<Notification>>> {
    let notifications = store::list(
        &db_pool,
        &identity.user_id,
        config.page_limit(limit),
        skip.unwrap_or(0),
    )
    .await?;
    Ok(Json(notifications))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unread(
    State(db_pool): State<SqlitePool>,
    identity: Identity,
) -> AppResult<Json<UnreadCount>> {
    let count = store::unread_count(&db_pool, &identity.user_id).await?;
    Ok(Json(UnreadCount { count }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn read(
    Path(id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Arc<Hub>>,
    identity: Identity,
) -> AppResult<Json<UnreadCount>> {
    store::mark_read(&db_pool, &identity.user_id, id).await?;
    let count = super::publish_count(&db_pool, &hub, &identity.user_id).await?;
    Ok(Json(UnreadCount { count }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn read_all(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Arc<Hub>>,
    identity: Identity,
) -> AppResult<Json<UnreadCount>> {
    let marked = store::mark_all_read(&db_pool, &identity.user_id).await?;
    tracing::debug!(user_id = %identity.user_id, marked, "marked all read");
    let count = super::publish_count(&db_pool, &hub, &identity.user_id).await?;
    Ok(Json(UnreadCount { count }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TriggerRequest {
    user_id: String,
    payload: serde_json::Value,
}

/// Entry point for whatever raises notifications (reviews, reports, ...).
#[debug_handler(state = AppState)]
pub(crate) async fn trigger(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Arc<Hub>>,
    State(config): State<Arc<Config>>,
    headers: HeaderMap,
    Json(TriggerRequest { user_id, payload }): Json<TriggerRequest>,
) -> AppResult<(StatusCode, Json<Notification>)> {
    if let Some(expected) = &config.trigger_token {
        let supplied = headers.get(TRIGGER_TOKEN_HEADER).and_then(|v| v.to_str().ok());
        if supplied != Some(expected.as_str()) {
            return Err(ChatError::forbidden("trigger", "notification trigger").into());
        }
    }
    if user_id.trim().is_empty() {
        return Err(ChatError::Malformed("userId is empty".to_owned()).into());
    }

    let notification = super::emit(&db_pool, &hub, &user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}
