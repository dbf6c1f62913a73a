//! Gateway HTTP server.

use crate::config::{self, Config};
use crate::gateway::protocol::{ChatRequest, ChatResponse};
use crate::relay::{MessageRelay, RelayError};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Header carrying the caller's session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub relay: Arc<MessageRelay>,
    /// Cancelled on shutdown so in-flight run polls stop waiting.
    pub shutdown: CancellationToken,
}

/// Build the router (CORS applied) for the given state.
pub fn router(state: GatewayState) -> Router {
    let cors = cors_layer(&state.config.gateway.allowed_origins);
    Router::new()
        .route("/", get(health_http))
        .route("/chat", post(chat))
        .layer(cors)
        .with_state(state)
}

/// Any origin when none are configured (local UI development); otherwise only the listed ones.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::very_permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(_) => {
                log::warn!("ignoring invalid allowed origin: {}", o);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(SESSION_HEADER)])
}

/// Start the relay server and run until SIGINT/SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "gateway bound to non-loopback address {}; /chat has no authentication",
            bind
        );
    }

    let relay = MessageRelay::from_config(&config).context("configuring agent relay")?;
    let shutdown = CancellationToken::new();
    let state = GatewayState {
        config: Arc::new(config.clone()),
        relay: Arc::new(relay),
        shutdown: shutdown.clone(),
    };
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Cancels `shutdown` so handlers waiting on runs return promptly.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, cancelling pending runs and draining connections");
    shutdown.cancel();
}

/// POST /chat: relay one message; failures of the agent still answer 200 with an apology reply.
async fn chat(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<serde_json::Value>)> {
    let Json(req) = body.map_err(|rejection| {
        log::debug!("chat: rejected body: {}", rejection);
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": rejection.body_text() })),
        )
    })?;
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("");
    log::debug!(
        "chat: session={} mode={} useRAG={}",
        session_id,
        req.mode,
        req.use_rag
    );

    match state
        .relay
        .process_message_with_cancel(session_id, &req.message, &state.shutdown)
        .await
    {
        Ok(reply) => Ok(Json(ChatResponse {
            reply: reply.reply,
            sources: Vec::new(),
        })),
        Err(RelayError::InvalidArgument(what)) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": what })),
        )),
        Err(e) => {
            log::error!("chat: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            ))
        }
    }
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "sessions": state.relay.mapper().store().len().await,
    }))
}
