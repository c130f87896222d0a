//! WebSocket Gateway
//!
//! Real-time communication via WebSocket connections.

pub mod handler;
pub mod messages;
pub mod transport;

pub use handler::ws_handler;
pub use messages::{FrameError, GatewayReceive, GatewaySend, OpCode};
pub use transport::WsConnection;
