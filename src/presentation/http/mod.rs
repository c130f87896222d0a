//! HTTP Surface
//!
//! Router plus the health and metrics endpoints.

pub mod health;
pub mod routes;
