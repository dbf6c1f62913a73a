//! Gateway: HTTP front door for the relay.
//!
//! `POST /chat` relays one message for the session named in the `x-session-id` header;
//! `GET /` reports health.

pub mod protocol;
mod server;

pub use protocol::{ChatMode, ChatRequest, ChatResponse};
pub use server::{router, run_gateway, GatewayState, SESSION_HEADER};
