//! tether-core: Core abstractions and configuration for tether
//!
//! This crate provides the shared types, transport traits, wire protocol
//! and configuration structures used by the command client and the CLI.

pub mod config;
pub mod error;
pub mod ipc;
pub mod transport;
pub mod types;

pub use error::{ConfigError, TransportError};
pub use transport::{ClientOptions, CommandTransport, EventSink, GroupIter, TransportClient};
pub use types::{ConnectionPhase, OutboundGroup, StatusMessage, SubscriptionKind};
