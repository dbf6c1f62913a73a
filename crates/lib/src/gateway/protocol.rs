//! Chat endpoint wire types, shared by the server and the chat controller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which experience the user picked: plain assistant or the hosted agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Basic,
    Agent,
}

impl ChatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatMode::Basic => "basic",
            ChatMode::Agent => "agent",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(ChatMode::Basic),
            "agent" => Ok(ChatMode::Agent),
            other => Err(format!("unknown chat mode: {}", other)),
        }
    }
}

/// Body of `POST /chat`: `{ "message", "useRAG", "mode" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(rename = "useRAG", default)]
    pub use_rag: bool,
    #[serde(default)]
    pub mode: ChatMode,
}

/// Response of `POST /chat`: `{ "reply", "sources" }`. Missing sources read as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_original_field_names() {
        let req = ChatRequest {
            message: "Hello".to_string(),
            use_rag: true,
            mode: ChatMode::Basic,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"message": "Hello", "useRAG": true, "mode": "basic"})
        );
        let parsed: ChatRequest = serde_json::from_str(r#"{"message":"x"}"#).unwrap();
        assert!(!parsed.use_rag);
        assert_eq!(parsed.mode, ChatMode::Basic);
    }

    #[test]
    fn response_without_sources() {
        let res: ChatResponse = serde_json::from_str(r#"{"reply":"Hi!"}"#).unwrap();
        assert!(res.sources.is_empty());
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Agent".parse::<ChatMode>(), Ok(ChatMode::Agent));
        assert!("expert".parse::<ChatMode>().is_err());
    }
}
