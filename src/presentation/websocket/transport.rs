//! WebSocket Connection Handle
//!
//! Bridges the hub's [`ConnectionHandle`] to a socket's outbound queue. The
//! socket writer task drains the queue; a full queue means the peer is not
//! keeping up, and the delivery times out instead of blocking the fan-out.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use super::messages::GatewaySend;
use crate::domain::{ConnectionHandle, Delivery, DeliveryError};

/// Outbound side of one WebSocket connection.
pub struct WsConnection {
    tx: mpsc::Sender<GatewaySend>,
}

impl WsConnection {
    pub fn new(tx: mpsc::Sender<GatewaySend>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ConnectionHandle for WsConnection {
    async fn deliver(&self, delivery: &Delivery, timeout: Duration) -> Result<(), DeliveryError> {
        self.tx
            .send_timeout(GatewaySend::message_create(delivery), timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => DeliveryError::Timeout(timeout),
                SendTimeoutError::Closed(_) => DeliveryError::Closed,
            })
    }
}
