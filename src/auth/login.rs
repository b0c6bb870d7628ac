use std::sync::Arc;

use axum::{Json, debug_handler, extract::State, http::HeaderMap};
use tower_sessions::Session;

use crate::{
    AppResult, AppState, Config,
    error::ChatError,
    model::Identity,
    session::{ROLE, USER_ID},
};

pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

#[debug_handler(state = AppState)]
pub async fn login(
    State(config): State<Arc<Config>>,
    session: Session,
    headers: HeaderMap,
    Json(identity): Json<Identity>,
) -> AppResult<Json<Identity>> {
    if let Some(expected) = &config.session_token {
        let supplied = headers.get(SESSION_TOKEN_HEADER).and_then(|v| v.to_str().ok());
        if supplied != Some(expected.as_str()) {
            tracing::warn!(user_id = %identity.user_id, "session hand-off without a valid token");
            return Err(ChatError::forbidden(&identity.user_id, "session hand-off").into());
        }
    }
    if identity.user_id.trim().is_empty() {
        return Err(ChatError::Malformed("userId is empty".to_owned()).into());
    }

    session.insert(USER_ID, &identity.user_id).await?;
    session.insert(ROLE, identity.role).await?;

    tracing::info!(user_id = %identity.user_id, role = %identity.role, "session opened");
    Ok(Json(identity))
}
