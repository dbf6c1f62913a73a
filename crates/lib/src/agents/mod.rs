//! Hosted agent platform: wire types and the call contract the relay depends on.
//!
//! The platform owns threads, messages and runs; this crate only creates and reads them.

mod client;

pub use client::{AgentsClient, AgentsError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
}

/// Run status as reported by the platform. Only `queued` and `in_progress` mean "still running".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    /// Any other terminal value (failed, cancelled, expired, requires_action, ...).
    Other(String),
}

impl RunStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::InProgress)
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Other(s) => s,
        }
    }
}

impl From<String> for RunStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "completed" => RunStatus::Completed,
            _ => RunStatus::Other(s),
        }
    }
}

impl From<&str> for RunStatus {
    fn from(s: &str) -> Self {
        RunStatus::from(s.to_string())
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of the agent against a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
}

/// A message stored in a remote thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub role: String,
    #[serde(with = "timestamp", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// All `text` fragments concatenated in order; other content types are skipped.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.typ == "text")
            .filter_map(|c| c.text.as_ref())
            .map(|t| t.value.as_str())
            .collect()
    }
}

/// One content fragment (`{"type": "text", "text": {"value": ...}}`, images, etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<MessageText>,
}

impl MessageContent {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            typ: "text".to_string(),
            text: Some(MessageText {
                value: value.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageText {
    pub value: String,
}

/// Calls the relay makes against the agent platform.
#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn create_thread(&self) -> Result<Thread, AgentsError>;

    async fn create_message(
        &self,
        thread_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), AgentsError>;

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run, AgentsError>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AgentsError>;

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AgentsError>;
}

/// `created_at` arrives as unix seconds from the REST API and as RFC 3339 from some SDKs.
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(t.timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let value = Value::deserialize(d)?;
        let parsed = match &value {
            Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        };
        parsed.ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_round_trips_unknown_values() {
        let run: Run = serde_json::from_str(r#"{"id":"run_1","status":"requires_action"}"#).unwrap();
        assert_eq!(run.status, RunStatus::Other("requires_action".to_string()));
        assert!(!run.status.is_pending());
        assert_eq!(serde_json::to_value(&run).unwrap()["status"], "requires_action");
        assert!(RunStatus::from("queued").is_pending());
        assert!(RunStatus::from("in_progress").is_pending());
        assert!(!RunStatus::from("completed").is_pending());
    }

    #[test]
    fn message_accepts_unix_and_rfc3339_timestamps() {
        let a: ThreadMessage =
            serde_json::from_str(r#"{"role":"assistant","created_at":1700000000,"content":[]}"#)
                .unwrap();
        let b: ThreadMessage = serde_json::from_str(
            r#"{"role":"assistant","createdAt":"2023-11-14T22:13:21Z","content":[]}"#,
        )
        .unwrap();
        assert_eq!(a.created_at.timestamp(), 1_700_000_000);
        assert_eq!(b.created_at.timestamp(), 1_700_000_001);
    }

    #[test]
    fn text_joins_only_text_fragments() {
        let msg: ThreadMessage = serde_json::from_str(
            r#"{
                "role": "assistant",
                "created_at": 1,
                "content": [
                    {"type": "text", "text": {"value": "Hello, ", "annotations": []}},
                    {"type": "image_file", "image_file": {"file_id": "f1"}},
                    {"type": "text", "text": {"value": "world"}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(msg.text(), "Hello, world");
    }
}
