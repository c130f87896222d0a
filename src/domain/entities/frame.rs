//! Decoded client frames and their outcomes.
//!
//! Wire decoding belongs to the transport adapter; the hub only consumes the
//! decoded variants below.

use crate::domain::{ChannelId, PublishReport};

/// A decoded inbound frame from one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Subscribe(ChannelId),
    Unsubscribe(ChannelId),
    Publish { channel_id: ChannelId, payload: Vec<u8> },
    Heartbeat,
}

impl ClientFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Publish { .. } => "publish",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// What the hub did with a frame.
#[derive(Debug, Clone)]
pub enum FrameOutcome {
    Subscribed(ChannelId),
    Unsubscribed(ChannelId),
    Published(PublishReport),
    HeartbeatAck,
}
