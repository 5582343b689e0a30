//! API module
//!
//! This module provides the HTTP API server for the tally tracker.

pub mod server;

pub use server::{router, serve, AppState, ServerConfig};
