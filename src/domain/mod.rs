//! # Domain Layer
//!
//! The domain layer contains the core types of the hub. It is independent of
//! any transport or framework.
//!
//! ## Structure
//!
//! - **entities**: Session, Channel, Message, frames and the capability traits
//! - **value_objects**: identities and policies
//! - **services**: contracts for external collaborators (authentication)

pub mod entities;
pub mod services;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use services::*;
pub use value_objects::*;
