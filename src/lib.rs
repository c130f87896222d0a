//! # Chat Hub Library
//!
//! This crate provides the core of a WebSocket chat server:
//! - A connection registry tracking live sessions and their handles
//! - A channel index mapping channels to subscribed sessions
//! - A fan-out engine that sequences and delivers messages per channel
//! - A presence monitor that evicts silent sessions in two phases
//! - A thin JSON WebSocket gateway in front of it all
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Core entities, identities and capability traits
//! - **Application Layer**: The hub and its stateful services
//! - **Infrastructure Layer**: JWT authentication, message store, metrics
//! - **Presentation Layer**: HTTP routes and WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! chat_hub/
//! +-- config/         Configuration management
//! +-- domain/         Domain entities, value objects, and traits
//! +-- application/    Hub, registry, index, fan-out, presence
//! +-- infrastructure/ Auth, message store, metrics
//! +-- presentation/   HTTP routes and WebSocket handlers
//! +-- shared/         Common utilities (errors)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core types
pub mod domain;

// Application layer - Hub services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
