//! HTTP API module.
//!
//! This module provides the HTTP server, its request/response types, and the
//! log broadcaster streamed to clients.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::{LogBroadcaster, LogEntry, LogLevel};
pub use server::{build_router, start_server, AppState};
pub use types::*;
