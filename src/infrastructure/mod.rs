//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - JWT authentication
//! - Message store implementations
//! - Prometheus metrics

pub mod auth;
pub mod metrics;
pub mod store;
