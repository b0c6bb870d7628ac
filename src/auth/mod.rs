//! Identity hand-off from the auth collaborator.
//!
//! Credentials are checked upstream; this module only keeps the resulting
//! `(userId, role)` in the session and hands it to handlers as an [`Identity`].

mod login;
mod logout;

use axum::{
    Router,
    extract::FromRequestParts,
    http::request::Parts,
    routing::post,
};
use tower_sessions::Session;

use crate::{
    AppError, AppState,
    error::ChatError,
    model::{Identity, Role},
    session::{ROLE, USER_ID},
};

pub use login::{SESSION_TOKEN_HEADER, login};
pub use logout::logout;

pub fn router() -> Router<AppState> {
    Router::new().route("/session", post(login).delete(logout))
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::from(msg))?;

        let Some(user_id) = session.get::<String>(USER_ID).await? else {
            return Err(ChatError::Unauthenticated.into());
        };
        let Some(role) = session.get::<Role>(ROLE).await? else {
            return Err(ChatError::Unauthenticated.into());
        };

        Ok(Identity { user_id, role })
    }
}
