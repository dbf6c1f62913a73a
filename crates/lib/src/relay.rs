//! Message relay: one agent-platform exchange per user message.
//!
//! Resolve the session's thread, post the user message, start a run, poll until the run leaves
//! `queued`/`in_progress`, then read back the newest assistant message. Every failure except bad
//! input is folded into a `{success: false, reply}` result whose text is safe to show a user; the
//! cause is kept alongside as a [`FailureKind`].

use crate::agents::{AgentApi, AgentsClient, AgentsError, Run, RunStatus, ThreadMessage};
use crate::config::{self, Config, ConfigError};
use crate::session::{MemoryThreadStore, ThreadMapper};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const GENERIC_APOLOGY: &str =
    "Sorry, I encountered an error processing your request. Please try again.";
const NO_RESPONSE: &str = "I don't have a response at this time. Please try again.";

/// How long to wait between run status checks, and how long to wait in total.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("failed to create conversation thread: {0}")]
    ThreadCreationFailed(#[source] Arc<AgentsError>),
    #[error("run finished with status {0}")]
    RunNotCompleted(RunStatus),
    #[error("run completed without an assistant message")]
    NoAssistantResponse,
    #[error("run still {status} after {waited:?}")]
    Timeout { status: RunStatus, waited: Duration },
    #[error("cancelled while waiting for run")]
    Cancelled,
    #[error(transparent)]
    Agents(#[from] AgentsError),
}

/// Cause of a failed reply, for logs and tests. Never sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ThreadCreationFailed,
    RunNotCompleted,
    NoAssistantResponse,
    Timeout,
    Cancelled,
    Unexpected,
}

impl RelayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RelayError::ThreadCreationFailed(_) => FailureKind::ThreadCreationFailed,
            RelayError::RunNotCompleted(_) => FailureKind::RunNotCompleted,
            RelayError::NoAssistantResponse => FailureKind::NoAssistantResponse,
            RelayError::Timeout { .. } => FailureKind::Timeout,
            RelayError::Cancelled => FailureKind::Cancelled,
            RelayError::InvalidArgument(_) | RelayError::Agents(_) => FailureKind::Unexpected,
        }
    }

    /// Text shown to the user in place of an answer.
    pub fn user_reply(&self) -> String {
        match self {
            RelayError::RunNotCompleted(status) => format!(
                "Sorry, I encountered an error ({}). Please try again.",
                status
            ),
            RelayError::NoAssistantResponse => NO_RESPONSE.to_string(),
            _ => GENERIC_APOLOGY.to_string(),
        }
    }
}

/// Uniform relay result: `{success, reply}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayReply {
    pub success: bool,
    pub reply: String,
    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl RelayReply {
    fn ok(reply: String) -> Self {
        Self {
            success: true,
            reply,
            failure: None,
        }
    }

    fn failed(err: &RelayError) -> Self {
        Self {
            success: false,
            reply: err.user_reply(),
            failure: Some(err.kind()),
        }
    }
}

/// Forwards user messages to the configured agent and returns its reply.
pub struct MessageRelay {
    api: Arc<dyn AgentApi>,
    mapper: ThreadMapper,
    agent_id: String,
    poll: PollPolicy,
}

impl MessageRelay {
    pub fn new(
        api: Arc<dyn AgentApi>,
        store: MemoryThreadStore,
        agent_id: impl Into<String>,
        poll: PollPolicy,
    ) -> Self {
        Self {
            mapper: ThreadMapper::new(store, api.clone()),
            api,
            agent_id: agent_id.into(),
            poll,
        }
    }

    /// Build the relay against the hosted platform. Fails when the connection string or agent id is missing.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let connection = config::resolve_agent_connection(config)?;
        let api: Arc<dyn AgentApi> = Arc::new(AgentsClient::new(&connection));
        let store = MemoryThreadStore::from_config(&config.sessions);
        let poll = PollPolicy {
            interval: config.agent.poll_interval(),
            max_wait: config.agent.max_wait(),
        };
        log::info!(
            "relay using agent {} at {}",
            connection.agent_id,
            connection.endpoint
        );
        Ok(Self::new(api, store, connection.agent_id, poll))
    }

    pub fn mapper(&self) -> &ThreadMapper {
        &self.mapper
    }

    /// Relay one message. Only empty input is an `Err`; everything else becomes a reply.
    pub async fn process_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<RelayReply, RelayError> {
        self.process_message_with_cancel(session_id, message, &CancellationToken::new())
            .await
    }

    /// Same as [`process_message`](Self::process_message); cancelling `cancel` abandons the run wait.
    pub async fn process_message_with_cancel(
        &self,
        session_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<RelayReply, RelayError> {
        if session_id.is_empty() || message.is_empty() {
            return Err(RelayError::InvalidArgument(
                "session id and message are required",
            ));
        }
        match self.exchange(session_id, message, cancel).await {
            Ok(text) => Ok(RelayReply::ok(text)),
            Err(RelayError::InvalidArgument(what)) => Err(RelayError::InvalidArgument(what)),
            Err(e) => {
                match e.kind() {
                    FailureKind::RunNotCompleted | FailureKind::NoAssistantResponse => {
                        log::warn!("session {}: {}", session_id, e)
                    }
                    _ => log::error!("agent processing error for session {}: {}", session_id, e),
                }
                Ok(RelayReply::failed(&e))
            }
        }
    }

    async fn exchange(
        &self,
        session_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String, RelayError> {
        let thread_id = self.mapper.get_or_create_thread(session_id).await?;
        self.api.create_message(&thread_id, "user", message).await?;
        let run = self.api.create_run(&thread_id, &self.agent_id).await?;
        log::debug!("thread {}: started run {}", thread_id, run.id);

        let run = self.wait_for_run(&thread_id, run, cancel).await?;
        if run.status != RunStatus::Completed {
            return Err(RelayError::RunNotCompleted(run.status));
        }

        let messages = self.api.list_messages(&thread_id).await?;
        latest_assistant_message(&messages)
            .map(ThreadMessage::text)
            .ok_or(RelayError::NoAssistantResponse)
    }

    async fn wait_for_run(
        &self,
        thread_id: &str,
        mut run: Run,
        cancel: &CancellationToken,
    ) -> Result<Run, RelayError> {
        let started = Instant::now();
        let deadline = started + self.poll.max_wait;
        let timed_out = |status: &RunStatus| RelayError::Timeout {
            status: status.clone(),
            waited: started.elapsed(),
        };
        while run.status.is_pending() {
            let wake = (Instant::now() + self.poll.interval).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                _ = tokio::time::sleep_until(wake) => {}
            }
            // No new status request once the budget is spent.
            if Instant::now() >= deadline {
                return Err(timed_out(&run.status));
            }
            let run_id = run.id.clone();
            run = tokio::select! {
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Err(timed_out(&run.status)),
                r = self.api.get_run(thread_id, &run_id) => r?,
            };
            log::debug!("thread {}: run {} is {}", thread_id, run.id, run.status);
        }
        Ok(run)
    }
}

/// Newest assistant message by creation time; on equal timestamps the earlier list entry wins.
pub fn latest_assistant_message(messages: &[ThreadMessage]) -> Option<&ThreadMessage> {
    messages
        .iter()
        .filter(|m| m.role == "assistant")
        .fold(None, |best: Option<&ThreadMessage>, m| match best {
            Some(b) if b.created_at >= m.created_at => Some(b),
            _ => Some(m),
        })
}
