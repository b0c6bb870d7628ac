pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod notifications;
pub mod rooms;
pub mod session;
pub mod store;

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

pub use config::Config;
pub use error::ChatError;
use rooms::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub hub: Arc<Hub>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> Self {
        AppState {
            db_pool,
            hub: Arc::new(Hub::new(config.room_capacity)),
            config: Arc::new(config),
        }
    }
}

/// The whole HTTP + socket surface, sessions included.
pub fn app(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            state.config.session_idle_minutes,
        )));

    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(rooms::router())
        .nest("/notifications", notifications::router())
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> &'static str {
    "ok"
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<ChatError>() {
            Some(ChatError::EmptyMessage | ChatError::Malformed(_)) => StatusCode::BAD_REQUEST,
            Some(ChatError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            Some(ChatError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            Some(ChatError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(ChatError::Transport { .. }) => StatusCode::BAD_GATEWAY,
            Some(ChatError::Storage(_)) | None => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = ?self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, %status, "request rejected");
        }

        (status, self.0.to_string()).into_response()
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(ChatError);
apperr_impl!(tower_sessions::session::Error);

// sqlx errors go through ChatError so they keep their status mapping.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self(anyhow::Error::from(ChatError::Storage(err)))
    }
}
