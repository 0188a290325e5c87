//! Wire protocol between a command client and the background service
//!
//! Messages are JSON objects, one per line, tagged by `type`. The client
//! sends a single [`CommandRequest::Subscribe`]; the service answers with
//! [`CommandEvent::Ready`] (or [`CommandEvent::Error`]) and then streams
//! events for the requested subscription until either side closes.

use serde::{Deserialize, Serialize};

use crate::transport::ClientOptions;
use crate::types::{OutboundGroup, StatusMessage, SubscriptionKind};

/// Name of the command socket inside the service's working directory
pub const COMMAND_SOCKET_NAME: &str = "command.sock";

/// Name of the file holding the TCP port on platforms without Unix sockets
pub const COMMAND_PORT_FILE_NAME: &str = "command.port";

/// TCP port used when no port file exists
pub const DEFAULT_COMMAND_PORT: u16 = 22300;

/// Request from client to service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandRequest {
    /// Subscribe to one event stream
    Subscribe {
        command: SubscriptionKind,
        status_interval_nanos: u64,
    },
}

impl From<&ClientOptions> for CommandRequest {
    fn from(options: &ClientOptions) -> Self {
        CommandRequest::Subscribe {
            command: options.command,
            status_interval_nanos: options.status_interval_nanos(),
        }
    }
}

/// Message pushed from service to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandEvent {
    /// Subscription accepted
    Ready,

    /// Subscription refused
    Error { message: String },

    /// Log line
    Log { message: Option<String> },

    /// Status snapshot
    Status { status: Option<StatusMessage> },

    /// Full outbound group list
    Groups { groups: Option<Vec<OutboundGroup>> },

    /// Service is closing the subscription
    Closed { reason: Option<String> },
}

/// Serialize a message as one newline-terminated line
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Parse one line, ignoring surrounding whitespace
pub fn decode_line<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(line.trim())
}
