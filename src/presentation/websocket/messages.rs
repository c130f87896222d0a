//! WebSocket Message Types
//!
//! Gateway frame formats and their mapping to hub frames.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::{ChannelId, ClientFrame, Delivery, FrameOutcome, SessionId, UserId};
use crate::shared::error::ErrorResponse;

/// Gateway opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Event dispatch
    Dispatch = 0,
    /// Heartbeat
    Heartbeat = 1,
    /// Identify
    Identify = 2,
    /// Join a channel
    Subscribe = 3,
    /// Leave a channel
    Unsubscribe = 4,
    /// Publish to a channel
    Publish = 5,
    /// Invalid session
    InvalidSession = 9,
    /// Hello
    Hello = 10,
    /// Heartbeat ACK
    HeartbeatAck = 11,
    /// Request acknowledged
    Ack = 12,
    /// Request rejected
    Reject = 13,
}

impl TryFrom<u8> for OpCode {
    type Error = FrameError;

    fn try_from(op: u8) -> Result<Self, FrameError> {
        Ok(match op {
            0 => OpCode::Dispatch,
            1 => OpCode::Heartbeat,
            2 => OpCode::Identify,
            3 => OpCode::Subscribe,
            4 => OpCode::Unsubscribe,
            5 => OpCode::Publish,
            9 => OpCode::InvalidSession,
            10 => OpCode::Hello,
            11 => OpCode::HeartbeatAck,
            12 => OpCode::Ack,
            13 => OpCode::Reject,
            other => return Err(FrameError::UnknownOpcode(other)),
        })
    }
}

/// Inbound frame that could not be turned into a hub frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Unknown opcode: {0}")]
    UnknownOpcode(u8),

    #[error("Opcode {0:?} is not accepted here")]
    Unexpected(OpCode),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Incoming gateway message
#[derive(Debug, Deserialize)]
pub struct GatewayReceive {
    pub op: u8,
    pub d: Option<serde_json::Value>,
    pub s: Option<u64>,
    pub t: Option<String>,
}

/// Outgoing gateway message
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySend {
    pub op: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

/// Hello payload (op 10)
#[derive(Debug, Serialize)]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
}

/// Ready payload (dispatch READY)
#[derive(Debug, Serialize)]
pub struct ReadyPayload {
    pub session_id: SessionId,
    pub user_id: UserId,
}

/// Identify payload (op 2)
#[derive(Debug, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
}

/// Subscribe / Unsubscribe payload (op 3, op 4)
#[derive(Debug, Deserialize)]
pub struct ChannelPayload {
    pub channel_id: ChannelId,
}

/// Publish payload (op 5)
#[derive(Debug, Deserialize)]
pub struct PublishPayload {
    pub channel_id: ChannelId,
    pub content: String,
}

/// Message dispatch payload (dispatch MESSAGE_CREATE)
#[derive(Debug, Serialize)]
pub struct MessageCreatePayload<'a> {
    pub channel_id: &'a ChannelId,
    pub author_id: &'a UserId,
    pub session_id: &'a SessionId,
    pub sequence: u64,
    pub content: String,
    pub timestamp: String,
}

impl GatewayReceive {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))
    }

    pub fn opcode(&self) -> Result<OpCode, FrameError> {
        OpCode::try_from(self.op)
    }

    fn data<T: serde::de::DeserializeOwned>(self) -> Result<T, FrameError> {
        let d = self
            .d
            .ok_or_else(|| FrameError::InvalidPayload("missing d".into()))?;
        serde_json::from_value(d).map_err(|e| FrameError::InvalidPayload(e.to_string()))
    }

    /// Identify payload, if this is an Identify frame.
    pub fn into_identify(self) -> Result<IdentifyPayload, FrameError> {
        match self.opcode()? {
            OpCode::Identify => self.data(),
            other => Err(FrameError::Unexpected(other)),
        }
    }

    /// Map an identified session's frame onto a hub frame.
    pub fn into_client_frame(self) -> Result<ClientFrame, FrameError> {
        match self.opcode()? {
            OpCode::Heartbeat => Ok(ClientFrame::Heartbeat),
            OpCode::Subscribe => {
                let payload: ChannelPayload = self.data()?;
                Ok(ClientFrame::Subscribe(payload.channel_id))
            }
            OpCode::Unsubscribe => {
                let payload: ChannelPayload = self.data()?;
                Ok(ClientFrame::Unsubscribe(payload.channel_id))
            }
            OpCode::Publish => {
                let payload: PublishPayload = self.data()?;
                Ok(ClientFrame::Publish {
                    channel_id: payload.channel_id,
                    payload: payload.content.into_bytes(),
                })
            }
            other => Err(FrameError::Unexpected(other)),
        }
    }
}

impl GatewaySend {
    fn frame(op: OpCode, d: Option<serde_json::Value>) -> Self {
        Self {
            op: op as u8,
            d,
            s: None,
            t: None,
        }
    }

    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::frame(
            OpCode::Hello,
            serde_json::to_value(HelloPayload { heartbeat_interval }).ok(),
        )
    }

    pub fn heartbeat_ack() -> Self {
        Self::frame(OpCode::HeartbeatAck, None)
    }

    pub fn invalid_session() -> Self {
        Self::frame(OpCode::InvalidSession, Some(json!(false)))
    }

    pub fn error(response: ErrorResponse) -> Self {
        Self::frame(OpCode::Reject, serde_json::to_value(response).ok())
    }

    pub fn ready(session_id: SessionId, user_id: UserId) -> Self {
        Self {
            op: OpCode::Dispatch as u8,
            d: serde_json::to_value(ReadyPayload {
                session_id,
                user_id,
            })
            .ok(),
            s: None,
            t: Some("READY".to_string()),
        }
    }

    /// Dispatch frame carrying one delivered message. `s` is the channel
    /// sequence number.
    pub fn message_create(delivery: &Delivery) -> Self {
        let message = &delivery.message;
        Self {
            op: OpCode::Dispatch as u8,
            d: serde_json::to_value(MessageCreatePayload {
                channel_id: &message.channel_id,
                author_id: &message.sender_user,
                session_id: &message.sender,
                sequence: message.sequence,
                content: String::from_utf8_lossy(&message.payload).into_owned(),
                timestamp: message.published_at.to_rfc3339(),
            })
            .ok(),
            s: Some(message.sequence),
            t: Some("MESSAGE_CREATE".to_string()),
        }
    }

    /// Reply to a handled client frame.
    pub fn from_outcome(outcome: &FrameOutcome) -> Self {
        match outcome {
            FrameOutcome::HeartbeatAck => Self::heartbeat_ack(),
            FrameOutcome::Subscribed(channel_id) => Self::frame(
                OpCode::Ack,
                Some(json!({ "type": "subscribed", "channel_id": channel_id })),
            ),
            FrameOutcome::Unsubscribed(channel_id) => Self::frame(
                OpCode::Ack,
                Some(json!({ "type": "unsubscribed", "channel_id": channel_id })),
            ),
            FrameOutcome::Published(report) => Self::frame(
                OpCode::Ack,
                Some(json!({
                    "type": "published",
                    "channel_id": report.channel_id,
                    "sequence": report.sequence,
                    "delivered": report.delivered_count(),
                    "skipped": report.skipped_count(),
                    "failed": report.failed_count(),
                })),
            ),
        }
    }
}
