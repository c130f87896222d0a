//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure: a scriptable
//! transport simulator, a recording message store and an HTTP test app.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use chat_hub::application::Hub;
use chat_hub::config::{
    HubSettings, JwtSettings, LogFormat, ServerSettings, Settings, WebSocketSettings,
};
use chat_hub::domain::{
    ChannelId, ConnectionHandle, Delivery, DeliveryError, Message, MessageStore, SessionId,
    StoreError,
};
use chat_hub::infrastructure::auth::JwtAuthenticator;
use chat_hub::presentation::http::routes;
use chat_hub::startup::AppState;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-at-least-32-bytes";

/// How a [`TestTransport`] reacts to a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Accept,
    Fail,
    Stall(Duration),
}

/// One delivery observed by a [`TestTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub channel_id: ChannelId,
    pub sender: SessionId,
    pub sequence: u64,
    pub payload: Vec<u8>,
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Scriptable connection simulator.
pub struct TestTransport {
    behavior: Mutex<Behavior>,
    received: Mutex<Vec<Received>>,
    hook: Mutex<Option<Hook>>,
}

impl TestTransport {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            received: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
        })
    }

    pub fn accepting() -> Arc<Self> {
        Self::new(Behavior::Accept)
    }

    pub fn failing() -> Arc<Self> {
        Self::new(Behavior::Fail)
    }

    pub fn stalling(delay: Duration) -> Arc<Self> {
        Self::new(Behavior::Stall(delay))
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    /// Run `hook` at the start of every delivery attempt.
    pub fn on_deliver(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().clone()
    }

    pub fn sequences(&self, channel_id: &ChannelId) -> Vec<u64> {
        self.received
            .lock()
            .iter()
            .filter(|r| &r.channel_id == channel_id)
            .map(|r| r.sequence)
            .collect()
    }

    fn record(&self, delivery: &Delivery) {
        self.received.lock().push(Received {
            channel_id: delivery.channel_id().clone(),
            sender: delivery.message.sender.clone(),
            sequence: delivery.sequence(),
            payload: delivery.payload().to_vec(),
        });
    }
}

#[async_trait]
impl ConnectionHandle for TestTransport {
    async fn deliver(&self, delivery: &Delivery, _timeout: Duration) -> Result<(), DeliveryError> {
        if let Some(hook) = self.hook.lock().as_ref() {
            hook();
        }

        let behavior = *self.behavior.lock();
        match behavior {
            Behavior::Accept => {
                self.record(delivery);
                Ok(())
            }
            Behavior::Fail => Err(DeliveryError::Transport("simulated failure".into())),
            Behavior::Stall(delay) => {
                tokio::time::sleep(delay).await;
                self.record(delivery);
                Ok(())
            }
        }
    }
}

/// Message store that keeps everything it is given.
#[derive(Default)]
pub struct RecordingStore {
    messages: Mutex<Vec<Message>>,
    fail: Mutex<bool>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl MessageStore for RecordingStore {
    async fn append(&self, message: &Message) -> Result<(), StoreError> {
        if *self.fail.lock() {
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

/// Hub settings with test-friendly timings.
pub fn hub_settings() -> HubSettings {
    HubSettings {
        delivery_timeout_ms: 200,
        ..HubSettings::default()
    }
}

pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        hub: hub_settings(),
        websocket: WebSocketSettings {
            max_message_size: 70_000,
            identify_timeout_secs: 5,
            outbound_queue_size: 16,
        },
        jwt: JwtSettings {
            secret: TEST_JWT_SECRET.into(),
        },
        log_format: LogFormat::Pretty,
        environment: "test".into(),
    }
}

/// Test application builder
pub struct TestApp {
    pub router: Router,
    pub hub: Arc<Hub>,
}

impl TestApp {
    /// Create a test application around a fresh hub
    pub async fn new() -> Self {
        let settings = test_settings();
        let hub = Arc::new(Hub::new(settings.hub.clone()));
        hub.start();

        let state = AppState {
            hub: Arc::clone(&hub),
            authenticator: Arc::new(JwtAuthenticator::new(&settings.jwt)),
            settings: Arc::new(settings),
        };

        Self {
            router: routes::create_router(state),
            hub,
        }
    }

    /// Make a GET request to the application
    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }
}
