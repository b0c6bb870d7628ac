use async_trait::async_trait;
use reqwest::{
    Method, RequestBuilder, StatusCode, Url,
    header::{COOKIE, SET_COOKIE},
};
use uuid::Uuid;

use crate::{
    auth::SESSION_TOKEN_HEADER,
    error::ChatError,
    model::{Conversation, Identity, Message, NewMessage, Notification, UnreadCount},
    store::{MessageStore, NotificationApi},
};

/// REST client for the relay's history and notification endpoints.
#[derive(Clone)]
pub struct HttpBackend {
    base: Url,
    http: reqwest::Client,
    cookie: Option<String>,
    session_token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, ChatError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| ChatError::Malformed(format!("base url {base_url}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(HttpBackend {
            base,
            http: reqwest::Client::new(),
            cookie: None,
            session_token: None,
        })
    }

    /// Secret presented on sign-in when the relay requires one.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Opens a session for `identity` and keeps its cookie for later calls.
    pub async fn sign_in(mut self, identity: &Identity) -> Result<Self, ChatError> {
        let mut request = self.request(Method::POST, &["session"])?.json(identity);
        if let Some(token) = &self.session_token {
            request = request.header(SESSION_TOKEN_HEADER, token);
        }
        let response = request.send().await?;
        let response = check(response).await?;

        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::to_owned)
            .ok_or_else(|| ChatError::transport("sign-in response carried no session cookie"))?;

        tracing::debug!(user_id = %identity.user_id, "signed in");
        self.cookie = Some(cookie);
        Ok(self)
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    /// `ws://` or `wss://` address of the socket endpoint.
    pub fn socket_url(&self) -> Result<Url, ChatError> {
        let mut url = self.endpoint(&["ws"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ChatError::Malformed(format!("cannot derive socket url from {}", self.base)))?;
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ChatError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ChatError::Malformed(format!("{} cannot be a base", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ChatError> {
        let builder = self.http.request(method, self.endpoint(segments)?);
        Ok(match &self.cookie {
            Some(cookie) => builder.header(COOKIE, cookie),
            None => builder,
        })
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::BAD_REQUEST => ChatError::Malformed(body),
        StatusCode::UNAUTHORIZED => ChatError::Unauthenticated,
        StatusCode::FORBIDDEN => ChatError::Forbidden {
            user: "session".to_owned(),
            resource: body,
        },
        StatusCode::NOT_FOUND => ChatError::NotFound(body),
        _ => ChatError::transport(format!("{status}: {body}")),
    })
}

#[async_trait]
impl MessageStore for HttpBackend {
    async fn history(
        &self,
        conversation: &Conversation,
        before: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }

        let response = self
            .request(
                Method::GET,
                &["conversation", &conversation.teacher_id, &conversation.student_id],
            )?
            .query(&query)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn append(&self, message: NewMessage) -> Result<Message, ChatError> {
        let response = self.request(Method::POST, &["send"])?.json(&message).send().await?;
        Ok(check(response).await?.json().await?)
    }
}

#[async_trait]
impl NotificationApi for HttpBackend {
    async fn list(&self, limit: u32, skip: u32) -> Result<Vec<Notification>, ChatError> {
        let response = self
            .request(Method::GET, &["notifications"])?
            .query(&[("limit", limit), ("skip", skip)])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn unread_count(&self) -> Result<u64, ChatError> {
        let response = self.request(Method::GET, &["notifications", "unread"])?.send().await?;
        let UnreadCount { count } = check(response).await?.json().await?;
        Ok(count)
    }

    async fn mark_read(&self, id: Uuid) -> Result<(), ChatError> {
        let id = id.to_string();
        let response = self
            .request(Method::PUT, &["notifications", &id, "read"])?
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ChatError> {
        let response = self
            .request(Method::PUT, &["notifications", "read-all"])?
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_joined_under_the_base_path() {
        let backend = HttpBackend::new("http://localhost:8080/api").unwrap();
        let url = backend.endpoint(&["conversation", "t 1", "s/1"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/conversation/t%201/s%2F1");
    }

    #[test]
    fn socket_url_swaps_scheme() {
        let plain = HttpBackend::new("http://localhost:8080").unwrap();
        assert_eq!(plain.socket_url().unwrap().as_str(), "ws://localhost:8080/ws");

        let tls = HttpBackend::new("https://relay.example/").unwrap();
        assert_eq!(tls.socket_url().unwrap().as_str(), "wss://relay.example/ws");
    }

    #[test]
    fn bad_base_is_malformed() {
        assert!(matches!(HttpBackend::new("not a url"), Err(ChatError::Malformed(_))));
    }
}
