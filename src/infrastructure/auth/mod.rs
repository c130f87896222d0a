//! Authentication Infrastructure
//!
//! Token-based [`Authenticator`](crate::domain::Authenticator)
//! implementations used by the WebSocket gateway.

mod jwt_authenticator;

pub use jwt_authenticator::{Claims, JwtAuthenticator};
