//! Transport abstractions
//!
//! A transport opens clients bound to the service's working directory. Each
//! client pushes inbound events to an [`EventSink`] from threads the
//! transport owns.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportError;
use crate::types::{OutboundGroup, StatusMessage, SubscriptionKind};

/// Default interval between status pushes requested from the service
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(2);

/// One-shot, forward-only sequence of group records
pub type GroupIter = Box<dyn Iterator<Item = OutboundGroup> + Send>;

/// Options sent to the service when a client subscribes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Event stream to subscribe to
    pub command: SubscriptionKind,
    /// How often the service should push status snapshots
    pub status_interval: Duration,
}

impl ClientOptions {
    /// Options for `command` with the default status interval
    pub fn new(command: SubscriptionKind) -> Self {
        Self {
            command,
            status_interval: DEFAULT_STATUS_INTERVAL,
        }
    }

    /// Override the status interval
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Status interval in nanoseconds, saturating at `u64::MAX`
    pub fn status_interval_nanos(&self) -> u64 {
        u64::try_from(self.status_interval.as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Callbacks invoked by a transport client when the service pushes events.
///
/// Implementations may block the calling thread, so transports must invoke
/// them from threads where blocking is allowed, never directly from an async
/// task.
pub trait EventSink: Send + Sync + 'static {
    /// The subscription is established
    fn connected(&self);

    /// The subscription ended
    fn disconnected(&self, reason: Option<String>);

    /// A log line arrived
    fn write_log(&self, message: Option<String>);

    /// A status snapshot arrived
    fn write_status(&self, message: Option<StatusMessage>);

    /// A full group list arrived
    fn write_groups(&self, groups: Option<GroupIter>);
}

/// One logical connection to the background service
#[async_trait]
pub trait TransportClient: Send + 'static {
    /// Perform a single connection attempt
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear the connection down. Must not block on the network.
    fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Factory for transport clients
pub trait CommandTransport: Send + Sync + 'static {
    /// Client type produced by this transport
    type Client: TransportClient;

    /// Construct a client bound to `working_directory` and `sink`.
    ///
    /// Does not touch the network.
    fn new_client(
        &self,
        working_directory: &Path,
        sink: Arc<dyn EventSink>,
        options: ClientOptions,
    ) -> Result<Self::Client, TransportError>;
}
