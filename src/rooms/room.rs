use std::sync::Arc;

use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    AppResult, AppState, Config,
    model::{Conversation, Identity, Message, NewMessage},
};

use super::msg;

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    before: Option<Uuid>,
    limit: Option<u32>,
}

/// One page of a conversation, newest first.
#[debug_handler(state = AppState)]
pub(crate) async fn conversation(
    Path((teacher_id, student_id)): Path<(String, String)>,
    Query(HistoryQuery { before, limit }): Query<HistoryQuery>,
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    identity: Identity,
) -> AppResult<Json<Vec<Message>>> {
    let conversation = Conversation::new(teacher_id, student_id);
    identity.authorize(&conversation)?;

    let messages = msg::fetch_history(&db_pool, &conversation, before, config.page_limit(limit)).await?;
    Ok(Json(messages))
}

#[debug_handler(state = AppState)]
pub(crate) async fn send(
    State(db_pool): State<SqlitePool>,
    identity: Identity,
    Json(new): Json<NewMessage>,
) -> AppResult<(StatusCode, Json<Message>)> {
    identity.authorize_sender(&new.conversation(), new.sender)?;

    let message = msg::insert_msg(&db_pool, new).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
