//! Application Layer
//!
//! Contains the hub services. This layer sits between the transport
//! adapters in `presentation` and the domain types.

pub mod services;

pub use services::{Hub, HubEvent, HubStats};
