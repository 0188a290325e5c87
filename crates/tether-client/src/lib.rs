//! tether-client: Resilient command client for a local background service
//!
//! A [`CommandClient`] subscribes to one event stream of the service
//! (status, groups or log), retries the handshake on a bounded linear
//! schedule, and exposes what the service pushes as observable state that is
//! only ever mutated on a single consumer thread.

pub mod backoff;
pub mod client;
pub mod dispatch;
pub mod session;
pub mod state;
pub mod transport;

pub use backoff::LinearBackoff;
pub use client::{ClientError, CommandClient};
pub use dispatch::Dispatcher;
pub use session::{ConnectionSession, SessionError};
pub use state::{observable_state, ConnectFailure, LogBuffer, ObservableState, StateView};
pub use transport::{Endpoint, LocalClient, LocalTransport};
