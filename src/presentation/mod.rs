//! Presentation Layer
//!
//! HTTP routes and the WebSocket gateway adapter.

pub mod http;
pub mod websocket;
