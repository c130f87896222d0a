//! # Domain Entities
//!
//! Core objects of the hub.
//!
//! - **Session**: one live connection (read-only snapshot)
//! - **Channel**: a conversation topic and its subscribers
//! - **Message**: an accepted, sequenced unit of communication
//! - **ClientFrame**: a decoded inbound frame
//!
//! ## Capability Traits
//!
//! - **ConnectionHandle**: attempt delivery to a remote peer
//! - **MessageStore**: persistence collaborator for accepted messages
//!
//! The traits are implemented outside the domain (transport adapters,
//! infrastructure, test doubles).

mod channel;
mod connection;
mod frame;
mod message;
mod session;

pub use channel::Channel;
pub use connection::{ConnectionHandle, DeliveryError};
pub use frame::{ClientFrame, FrameOutcome};
pub use message::{
    Delivery, DeliveryOutcome, DeliveryResult, Message, MessageStore, PublishReport, StoreError,
};
pub use session::{PresenceState, Session};

#[cfg(test)]
pub use connection::MockConnectionHandle;
#[cfg(test)]
pub use message::MockMessageStore;
