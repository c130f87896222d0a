//! # Domain Services
//!
//! Contracts for collaborators the hub consumes but does not implement.
//!
//! - **Authenticator**: resolves a client credential to a user identity

mod authenticator;

pub use authenticator::*;
