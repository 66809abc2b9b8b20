//! HTTP API for controlling moderation
//!
//! This module provides a REST API in place of chat commands:
//! - POST /groups/:id/monitoring - Join a voice channel and start monitoring
//! - DELETE /groups/:id/monitoring - Stop monitoring
//! - GET /groups/:id/monitoring - Session status
//! - GET/PUT /groups/:id/threshold - Read or set the decibel threshold
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
