//! Chat relay core library: agent platform client, session → thread mapping, message relay,
//! HTTP gateway, and the chat controller used by the CLI.

pub mod agents;
pub mod config;
pub mod gateway;
pub mod init;
pub mod relay;
pub mod session;
pub mod ui;
