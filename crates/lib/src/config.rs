//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.chat-relay/config.json`) and environment.
//! Agent platform credentials may come from either; environment wins.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default agents API version sent as the `api-version` query parameter.
pub const DEFAULT_API_VERSION: &str = "2024-12-01-preview";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Relay HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Agent platform connection and polling.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Session → thread table bounds.
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Terminal chat client settings.
    #[serde(default)]
    pub client: ClientConfig,
}

/// Gateway bind, port, and CORS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3001).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Origins allowed to call `POST /chat` from a browser. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_gateway_port() -> u16 {
    3001
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            allowed_origins: Vec::new(),
        }
    }
}

/// Agent platform settings. `connection_string` and `agent_id` are required to start the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Either a base URL or `host;subscriptionId;resourceGroup;projectName`. Overridden by AZURE_AI_CONNECTION_STRING.
    pub connection_string: Option<String>,
    /// Agent (assistant) id runs are started with. Overridden by AZURE_AI_AGENT_ID.
    pub agent_id: Option<String>,
    /// Bearer token for the platform. Overridden by AZURE_AI_TOKEN.
    pub token: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Delay between run status checks (default 1000 ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Give up waiting on a run after this many seconds (default 300).
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_wait_secs() -> u64 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            agent_id: None,
            token: None,
            api_version: default_api_version(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl AgentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// Bounds for the in-memory session → thread table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsConfig {
    /// Maximum number of mapped sessions; the cache evicts by size once full.
    #[serde(default = "default_session_capacity")]
    pub capacity: usize,
    /// Mappings unused for this long are dropped (default one day).
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
}

fn default_session_capacity() -> usize {
    10_000
}

fn default_idle_ttl_secs() -> u64 {
    86_400
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            capacity: default_session_capacity(),
            idle_ttl_secs: default_idle_ttl_secs(),
        }
    }
}

/// Terminal chat client settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Chat endpoint (default http://localhost:3001/chat).
    pub server_url: Option<String>,
    /// Where the message log is kept between runs (default ~/.chat-relay/history.json).
    pub history_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not configured (set it in config or via {1})")]
    Missing(&'static str, &'static str),
}

/// Connection parameters the relay cannot start without.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConnection {
    pub endpoint: String,
    pub agent_id: String,
    pub token: Option<String>,
    pub api_version: String,
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_nonempty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve agent connection: env AZURE_AI_* overrides config. Missing connection string or agent id is fatal.
pub fn resolve_agent_connection(config: &Config) -> Result<AgentConnection, ConfigError> {
    let connection_string = env_nonempty("AZURE_AI_CONNECTION_STRING")
        .or_else(|| config_nonempty(&config.agent.connection_string))
        .ok_or(ConfigError::Missing(
            "agent.connectionString",
            "AZURE_AI_CONNECTION_STRING",
        ))?;
    let agent_id = env_nonempty("AZURE_AI_AGENT_ID")
        .or_else(|| config_nonempty(&config.agent.agent_id))
        .ok_or(ConfigError::Missing("agent.agentId", "AZURE_AI_AGENT_ID"))?;
    let token = env_nonempty("AZURE_AI_TOKEN").or_else(|| config_nonempty(&config.agent.token));
    Ok(AgentConnection {
        endpoint: endpoint_from_connection_string(&connection_string),
        agent_id,
        token,
        api_version: config.agent.api_version.clone(),
    })
}

/// Turn a connection string into the agents API base URL.
/// A URL is used as-is; `host;subscription;resourceGroup;project` is expanded to the project's agents endpoint.
pub fn endpoint_from_connection_string(connection_string: &str) -> String {
    let s = connection_string.trim();
    if s.starts_with("http://") || s.starts_with("https://") {
        return s.trim_end_matches('/').to_string();
    }
    let parts: Vec<&str> = s.split(';').map(str::trim).collect();
    if let [host, subscription, resource_group, project] = parts.as_slice() {
        format!(
            "https://{}/agents/v1.0/subscriptions/{}/resourceGroups/{}/providers/Microsoft.MachineLearningServices/workspaces/{}",
            host, subscription, resource_group, project
        )
    } else {
        format!("https://{}", s.trim_end_matches('/'))
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CHAT_RELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".chat-relay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Resolve the chat endpoint the terminal client posts to.
pub fn resolve_server_url(config: &Config) -> String {
    config_nonempty(&config.client.server_url)
        .unwrap_or_else(|| format!("http://localhost:{}/chat", config.gateway.port))
}

/// Resolve where the client keeps its message log: configured path (relative to the config dir) or `history.json` beside the config.
pub fn resolve_history_path(config: &Config, config_path: &Path) -> PathBuf {
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.client.history_path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                config_parent.join(p)
            }
        }
        _ => config_parent.join("history.json"),
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Load config from the default path (or CHAT_RELAY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 3001);
        assert_eq!(g.bind, "127.0.0.1");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"agent":{"agentId":"asst_1"},"sessions":{"capacity":5}}"#)
                .unwrap();
        assert_eq!(config.agent.agent_id.as_deref(), Some("asst_1"));
        assert_eq!(config.agent.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.agent.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.sessions.capacity, 5);
        assert_eq!(config.sessions.idle_ttl_secs, 86_400);
    }

    #[test]
    fn endpoint_from_url_strips_trailing_slash() {
        assert_eq!(
            endpoint_from_connection_string("http://127.0.0.1:9000/"),
            "http://127.0.0.1:9000"
        );
    }

    #[test]
    fn endpoint_from_project_connection_string() {
        assert_eq!(
            endpoint_from_connection_string("eastus.api.azureml.ms;sub-1;rg-1;proj-1"),
            "https://eastus.api.azureml.ms/agents/v1.0/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.MachineLearningServices/workspaces/proj-1"
        );
    }

    #[test]
    fn missing_agent_id_is_reported() {
        // AZURE_AI_* are not set in the test environment; config alone decides.
        if std::env::var("AZURE_AI_AGENT_ID").is_ok()
            || std::env::var("AZURE_AI_CONNECTION_STRING").is_ok()
        {
            return;
        }
        let mut config = Config::default();
        config.agent.connection_string = Some("http://localhost:9000".to_string());
        assert_eq!(
            resolve_agent_connection(&config),
            Err(ConfigError::Missing("agent.agentId", "AZURE_AI_AGENT_ID"))
        );
        config.agent.agent_id = Some("  ".to_string());
        assert!(resolve_agent_connection(&config).is_err());
        config.agent.agent_id = Some("asst_1".to_string());
        let conn = resolve_agent_connection(&config).unwrap();
        assert_eq!(conn.endpoint, "http://localhost:9000");
        assert_eq!(conn.agent_id, "asst_1");
    }

    #[test]
    fn history_path_default_and_relative() {
        let mut config = Config::default();
        let path = Path::new("/home/user/.chat-relay/config.json");
        assert_eq!(
            resolve_history_path(&config, path),
            PathBuf::from("/home/user/.chat-relay/history.json")
        );
        config.client.history_path = Some(PathBuf::from("logs/chat.json"));
        assert_eq!(
            resolve_history_path(&config, path),
            PathBuf::from("/home/user/.chat-relay/logs/chat.json")
        );
    }

    #[test]
    fn server_url_follows_gateway_port() {
        let mut config = Config::default();
        config.gateway.port = 4000;
        assert_eq!(resolve_server_url(&config), "http://localhost:4000/chat");
    }
}
