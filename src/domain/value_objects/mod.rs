//! # Domain Value Objects
//!
//! Immutable value types that represent domain concepts without identity.
//!
//! ## Value Objects
//!
//! - **SessionId / UserId / ChannelId**: opaque string identities
//! - **ChannelRetention / SessionPolicy**: configurable hub policies

mod ids;
mod policy;

pub use ids::*;
pub use policy::*;
