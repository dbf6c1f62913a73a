//! Agents REST client (threads, messages, runs).
//! Every request carries `api-version`; a bearer token is attached when configured.

use crate::agents::{AgentApi, Run, Thread, ThreadMessage};
use crate::config::AgentConnection;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Client for the hosted agents HTTP API.
#[derive(Clone)]
pub struct AgentsClient {
    base_url: String,
    api_version: String,
    token: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentsError {
    #[error("agents request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("agents api error: {0}")]
    Api(String),
}

impl AgentsClient {
    pub fn new(connection: &AgentConnection) -> Self {
        Self {
            base_url: connection.endpoint.trim_end_matches('/').to_string(),
            api_version: connection.api_version.clone(),
            token: connection.token.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let req = self
            .client
            .request(method, &url)
            .query(&[("api-version", self.api_version.as_str())]);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, AgentsError> {
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AgentsError::Api(format!("{} {}", status, body)));
        }
        Ok(res.json().await?)
    }
}

#[async_trait]
impl AgentApi for AgentsClient {
    /// POST /threads
    async fn create_thread(&self) -> Result<Thread, AgentsError> {
        let req = self
            .request(reqwest::Method::POST, "/threads")
            .json(&serde_json::json!({}));
        self.send(req).await
    }

    /// POST /threads/{thread}/messages
    async fn create_message(
        &self,
        thread_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), AgentsError> {
        let req = self
            .request(
                reqwest::Method::POST,
                &format!("/threads/{}/messages", thread_id),
            )
            .json(&CreateMessageRequest { role, content });
        let _: serde_json::Value = self.send(req).await?;
        Ok(())
    }

    /// POST /threads/{thread}/runs
    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run, AgentsError> {
        let req = self
            .request(reqwest::Method::POST, &format!("/threads/{}/runs", thread_id))
            .json(&CreateRunRequest {
                assistant_id: agent_id,
            });
        self.send(req).await
    }

    /// GET /threads/{thread}/runs/{run}
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AgentsError> {
        let req = self.request(
            reqwest::Method::GET,
            &format!("/threads/{}/runs/{}", thread_id, run_id),
        );
        self.send(req).await
    }

    /// GET /threads/{thread}/messages
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AgentsError> {
        let req = self.request(
            reqwest::Method::GET,
            &format!("/threads/{}/messages", thread_id),
        );
        let data: ListMessagesResponse = self.send(req).await?;
        Ok(data.data)
    }
}

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListMessagesResponse {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}
