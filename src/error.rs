use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything the relay can fail with, on either side of the wire.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Message text was empty or only whitespace. Never reaches the network.
    #[error("message text is empty")]
    EmptyMessage,

    /// A network or channel hop failed. The caller may retry.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("not signed in")]
    Unauthenticated,

    /// The caller is not a party to the room or resource it touched.
    #[error("{user} may not access {resource}")]
    Forbidden { user: String, resource: String },

    #[error("{0} not found")]
    NotFound(String),

    /// A payload failed validation at the transport boundary.
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl ChatError {
    pub fn transport(message: impl Into<String>) -> Self {
        ChatError::Transport {
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ChatError::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn forbidden(user: &str, resource: impl Into<String>) -> Self {
        ChatError::Forbidden {
            user: user.to_owned(),
            resource: resource.into(),
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Transport { .. } | ChatError::Storage(_))
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::transport_with(format!("http request failed: {err}"), err)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ChatError::transport_with(format!("socket failed: {err}"), err)
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Malformed(err.to_string())
    }
}
