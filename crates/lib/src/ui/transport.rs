//! HTTP transport from the chat controller to `POST /chat`.

use crate::gateway::{ChatRequest, ChatResponse, SESSION_HEADER};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("chat request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chat api error: {0}")]
    Status(u16),
}

/// Sends one chat request and returns the server's answer.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError>;
}

/// Posts JSON to the relay, identifying the session by header.
#[derive(Clone)]
pub struct HttpTransport {
    url: String,
    session_id: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session_id: session_id.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let res = self
            .client
            .post(&self.url)
            .header(SESSION_HEADER, &self.session_id)
            .json(request)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(ClientError::Status(res.status().as_u16()));
        }
        Ok(res.json().await?)
    }
}
