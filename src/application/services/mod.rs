//! Application Services
//!
//! Stateful components behind the [`Hub`] facade.
//!
//! ## Available Services
//!
//! - **ConnectionRegistry**: live sessions, their handles and subscriptions
//! - **RoomIndex**: channel to subscriber index
//! - **FanoutEngine**: sequencing and per-target delivery
//! - **PresenceMonitor**: heartbeat timeout and two-phase eviction
//! - **EventBus**: lifecycle events for external observers

pub mod connection_registry;
pub mod events;
pub mod fanout_engine;
pub mod hub;
pub mod presence_monitor;
pub mod room_index;

pub use connection_registry::ConnectionRegistry;
pub use events::{EventBus, HubEvent};
pub use fanout_engine::{FanoutCounters, FanoutEngine};
pub use hub::{Hub, HubStats};
pub use presence_monitor::{PresenceMonitor, SweepReport};
pub use room_index::RoomIndex;
