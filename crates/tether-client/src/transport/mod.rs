//! Transports for reaching the background service
//!
//! [`LocalTransport`] speaks the line-delimited JSON protocol from
//! [`tether_core::ipc`] over the service's command socket.

mod local;

pub use local::{Endpoint, LocalClient, LocalTransport};
