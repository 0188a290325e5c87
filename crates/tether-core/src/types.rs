//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which event stream a client requests from the service at handshake time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    /// Periodic status snapshots
    Status,
    /// Outbound group topology
    Groups,
    /// Service log lines
    Log,
}

impl SubscriptionKind {
    /// All subscription kinds, in declaration order
    pub const ALL: [SubscriptionKind; 3] = [
        SubscriptionKind::Status,
        SubscriptionKind::Groups,
        SubscriptionKind::Log,
    ];

    /// Wire name of the subscription
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionKind::Status => "status",
            SubscriptionKind::Groups => "groups",
            SubscriptionKind::Log => "log",
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "status" => Ok(SubscriptionKind::Status),
            "groups" | "group" => Ok(SubscriptionKind::Groups),
            "log" | "logs" => Ok(SubscriptionKind::Log),
            other => Err(format!(
                "unknown subscription '{}' (expected status, groups or log)",
                other
            )),
        }
    }
}

/// Status snapshot pushed by the service.
///
/// The payload is forwarded as-is; its schema belongs to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusMessage(pub serde_json::Value);

impl StatusMessage {
    /// Wrap a raw JSON payload
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Borrow the raw payload
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Take the raw payload
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for StatusMessage {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One outbound group record pushed by the service.
///
/// Opaque like [`StatusMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboundGroup(pub serde_json::Value);

impl OutboundGroup {
    /// Wrap a raw JSON payload
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Borrow the raw payload
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Take the raw payload
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for OutboundGroup {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for OutboundGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of a command client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// No connect task and no handle
    Idle,
    /// A connect sequence is running
    Connecting,
    /// A connected handle is held
    Connected,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionPhase::Idle => write!(f, "idle"),
            ConnectionPhase::Connecting => write!(f, "connecting"),
            ConnectionPhase::Connected => write!(f, "connected"),
        }
    }
}
