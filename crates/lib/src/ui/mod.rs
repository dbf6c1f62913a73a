//! Chat controller: the client-side state behind a chat window.
//!
//! Holds the message log, input buffer, loading/retrieving flags, RAG toggle and mode, and
//! talks to the relay through a [`ChatTransport`]. The log is loaded from a [`HistoryStore`] when
//! the controller is built and written back in full after every change. Rendering is left to the
//! caller; the helpers here only answer what a view needs to show.

mod history;
mod transport;

pub use history::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
pub use transport::{ChatTransport, ClientError, HttpTransport};

use crate::gateway::{ChatMode, ChatRequest, ChatResponse};
use serde::{Deserialize, Serialize};

const SEND_FAILED_REPLY: &str = "Sorry, I encountered an error. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Sender label shown above a bubble.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "AI",
        }
    }
}

/// One entry of the chat log. Assistant entries carry the sources the server cited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: None,
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources: Some(sources),
        }
    }
}

/// Placeholder bubble while a request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    /// Retrieval was requested; shown as a system line.
    Retrieving,
    /// Waiting on the reply; `sender` is "Agent" in agent mode, "AI" otherwise.
    Thinking { sender: &'static str },
}

impl Pending {
    pub fn text(self) -> &'static str {
        match self {
            Pending::Retrieving => "📚 Searching employee handbook...",
            Pending::Thinking { .. } => "Thinking...",
        }
    }
}

pub struct ChatController<T, H> {
    transport: T,
    history: H,
    messages: Vec<ChatMessage>,
    input: String,
    is_loading: bool,
    is_retrieving: bool,
    rag_enabled: bool,
    mode: ChatMode,
}

impl<T: ChatTransport, H: HistoryStore> ChatController<T, H> {
    /// Restore the log from `history`; RAG on, basic mode.
    pub fn new(transport: T, history: H) -> Self {
        Self::with_mode(transport, history, ChatMode::Basic, true)
    }

    /// Restore the log and start in `mode`. The restored log is kept; agent mode starts with RAG off.
    pub fn with_mode(transport: T, history: H, mode: ChatMode, rag_enabled: bool) -> Self {
        let messages = history.load();
        log::debug!("chat: restored {} message(s)", messages.len());
        Self {
            transport,
            history,
            messages,
            input: String::new(),
            is_loading: false,
            is_retrieving: false,
            rag_enabled: rag_enabled && mode != ChatMode::Agent,
            mode,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_retrieving(&self) -> bool {
        self.is_retrieving
    }

    pub fn rag_enabled(&self) -> bool {
        self.rag_enabled
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Switching to a different mode starts a fresh log; agent mode turns RAG off.
    pub fn set_mode(&mut self, mode: ChatMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        if mode == ChatMode::Agent {
            self.rag_enabled = false;
        }
        self.clear();
    }

    /// RAG cannot be toggled in agent mode. Returns whether the toggle applied.
    pub fn set_rag_enabled(&mut self, enabled: bool) -> bool {
        if self.mode == ChatMode::Agent {
            return false;
        }
        self.rag_enabled = enabled;
        true
    }

    /// Empty the log and the stored history. No server call.
    pub fn clear(&mut self) {
        self.messages.clear();
        if let Err(e) = self.history.clear() {
            log::warn!("chat: clearing history failed: {}", e);
        }
    }

    pub fn can_send(&self) -> bool {
        !self.is_loading && !self.input.trim().is_empty()
    }

    /// Input box hint for the current mode.
    pub fn placeholder(&self) -> &'static str {
        match self.mode {
            ChatMode::Basic => "Ask about company policies, benefits, etc...",
            ChatMode::Agent => "Ask Agent",
        }
    }

    pub fn pending(&self) -> Option<Pending> {
        if self.is_retrieving {
            Some(Pending::Retrieving)
        } else if self.is_loading {
            Some(Pending::Thinking {
                sender: match self.mode {
                    ChatMode::Agent => "Agent",
                    ChatMode::Basic => "AI",
                },
            })
        } else {
            None
        }
    }

    /// First half of a send: append the user's message, clear input, raise the flags, and
    /// return the request to post. `None` when the input is blank or a send is in flight.
    pub fn begin_send(&mut self) -> Option<ChatRequest> {
        if !self.can_send() {
            return None;
        }
        let message = std::mem::take(&mut self.input);
        self.push(ChatMessage::user(message.clone()));
        self.is_loading = true;
        self.is_retrieving = self.rag_enabled;
        Some(ChatRequest {
            message,
            use_rag: self.rag_enabled,
            mode: self.mode,
        })
    }

    /// Second half of a send: append the reply (or an apology) and drop the flags.
    pub fn finish_send(&mut self, result: Result<ChatResponse, ClientError>) {
        let reply = match result {
            Ok(res) => ChatMessage::assistant(res.reply, res.sources),
            Err(e) => {
                log::warn!("chat: request failed: {}", e);
                ChatMessage::assistant(SEND_FAILED_REPLY, Vec::new())
            }
        };
        self.push(reply);
        self.is_loading = false;
        self.is_retrieving = false;
    }

    /// Send the current input and wait for the reply. Returns false when nothing was sent.
    pub async fn send(&mut self) -> bool {
        let Some(request) = self.begin_send() else {
            return false;
        };
        let result = self.transport.send(&request).await;
        self.finish_send(result);
        true
    }

    fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        if let Err(e) = self.history.save(&self.messages) {
            log::warn!("chat: saving history failed: {}", e);
        }
    }
}
