//! Command client: connect/disconnect control and observable event state
//!
//! `connect()` spawns a cancellable connect sequence on the runtime and
//! returns immediately; progress shows up in the connectivity flag.
//! `disconnect()` is synchronous and idempotent. Events pushed by the
//! transport are marshalled onto a dedicated consumer thread before they
//! touch the observable state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tether_core::config::ClientConfig;
use tether_core::{
    CommandTransport, ConnectionPhase, EventSink, GroupIter, OutboundGroup, StatusMessage,
    SubscriptionKind, TransportClient,
};

use crate::dispatch::Dispatcher;
use crate::session::{release, ConnectionSession, SessionError};
use crate::state::{observable_state, ConnectFailure, LogBuffer, ObservableState, StateView};

/// Name of the consumer thread that owns the observable state
const CONSUMER_THREAD_NAME: &str = "tether-main";

/// Errors raised while constructing a command client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Construction happened outside a tokio runtime
    #[error("No tokio runtime available, use with_runtime outside of one")]
    NoRuntime,

    /// The consumer thread could not be started
    #[error("Failed to start consumer thread: {0}")]
    Dispatcher(#[from] std::io::Error),
}

/// An outstanding connect sequence
struct ConnectTask {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// State shared between the client and its connect tasks
struct Shared<T: CommandTransport> {
    transport: T,
    config: ClientConfig,
    dispatcher: Dispatcher<ObservableState>,
    /// Bumped by every connect/disconnect; events from older sinks are dropped
    generation: Arc<AtomicU64>,
    task: Mutex<Option<ConnectTask>>,
    handle: Mutex<Option<T::Client>>,
}

/// Resilient client for one subscription to the background service
pub struct CommandClient<T: CommandTransport> {
    kind: SubscriptionKind,
    shared: Arc<Shared<T>>,
    view: StateView,
    runtime: Handle,
}

impl<T: CommandTransport> CommandClient<T> {
    /// Create a client on the current tokio runtime
    pub fn new(
        kind: SubscriptionKind,
        transport: T,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        Self::with_runtime(kind, transport, config, runtime)
    }

    /// Create a client whose connect tasks run on `runtime`
    pub fn with_runtime(
        kind: SubscriptionKind,
        transport: T,
        config: ClientConfig,
        runtime: Handle,
    ) -> Result<Self, ClientError> {
        let (state, view) = observable_state(config.log_max_lines);
        let dispatcher = Dispatcher::spawn(CONSUMER_THREAD_NAME, state)?;

        let shared = Arc::new(Shared {
            transport,
            config,
            dispatcher,
            generation: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
            handle: Mutex::new(None),
        });

        Ok(Self {
            kind,
            shared,
            view,
            runtime,
        })
    }

    /// Subscription requested by this client
    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Start a connect sequence unless already connected.
    ///
    /// Any sequence still running is cancelled and any handle still held is
    /// released first, so a repeated call restarts rather than joins.
    pub fn connect(&self) {
        if self.is_connected() {
            tracing::debug!(command = %self.kind, "Already connected, ignoring connect");
            return;
        }

        let mut task_slot = self.shared.task.lock();
        if let Some(previous) = task_slot.take() {
            tracing::debug!(command = %self.kind, "Superseding running connect sequence");
            previous.cancel.cancel();
        }
        self.shared.release_handle();

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let kind = self.kind;
        let token = cancel.clone();

        let join = self.runtime.spawn(async move {
            shared.run_connect(kind, generation, token).await;
        });

        *task_slot = Some(ConnectTask { cancel, join });
    }

    /// Cancel any connect sequence and release the connection. Idempotent.
    ///
    /// The sequence is cancelled before the handle slot is emptied, so a
    /// sequence that succeeds concurrently releases its client instead of
    /// storing it.
    pub fn disconnect(&self) {
        let task = {
            let mut task_slot = self.shared.task.lock();
            let task = task_slot.take();
            if let Some(task) = &task {
                task.cancel.cancel();
            }
            task
        };
        let handle = self.shared.handle.lock().take();
        if task.is_none() && handle.is_none() {
            return;
        }

        self.shared.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(mut client) = handle {
            if let Err(e) = client.disconnect() {
                tracing::warn!("Ignoring error during disconnect: {}", e);
            }
        }

        self.shared.dispatcher.run(|state| state.set_connected(false));
        tracing::info!(command = %self.kind, "Disconnected from service");
    }

    /// Where the client is in its connect lifecycle
    pub fn phase(&self) -> ConnectionPhase {
        if self.shared.handle.lock().is_some() {
            return ConnectionPhase::Connected;
        }
        match self.shared.task.lock().as_ref() {
            Some(task) if !task.join.is_finished() => ConnectionPhase::Connecting,
            _ => ConnectionPhase::Idle,
        }
    }

    /// Whether the service reported the subscription as established
    pub fn is_connected(&self) -> bool {
        self.view.is_connected()
    }

    /// Latest status snapshot
    pub fn status(&self) -> Option<StatusMessage> {
        self.view.status()
    }

    /// Latest outbound group list
    pub fn groups(&self) -> Option<Vec<OutboundGroup>> {
        self.view.groups()
    }

    /// Buffered log lines, oldest first
    pub fn log_list(&self) -> Vec<String> {
        self.view.log_list()
    }

    /// Why the last connect sequence gave up, if it did
    pub fn last_failure(&self) -> Option<ConnectFailure> {
        self.view.last_failure()
    }

    /// Subscribe to connectivity changes
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.view.watch_connected()
    }

    /// Subscribe to status changes
    pub fn watch_status(&self) -> watch::Receiver<Option<StatusMessage>> {
        self.view.watch_status()
    }

    /// Subscribe to group list changes
    pub fn watch_groups(&self) -> watch::Receiver<Option<Vec<OutboundGroup>>> {
        self.view.watch_groups()
    }

    /// Subscribe to log buffer changes
    pub fn watch_log(&self) -> watch::Receiver<LogBuffer> {
        self.view.watch_log()
    }

    /// Subscribe to connect failure diagnostics
    pub fn watch_last_failure(&self) -> watch::Receiver<Option<ConnectFailure>> {
        self.view.watch_last_failure()
    }
}

impl<T: CommandTransport> Drop for CommandClient<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<T: CommandTransport> Shared<T> {
    /// Body of a connect task
    async fn run_connect(
        self: Arc<Self>,
        kind: SubscriptionKind,
        generation: u64,
        cancel: CancellationToken,
    ) {
        let sink: Arc<dyn EventSink> = Arc::new(ClientSink {
            dispatcher: self.dispatcher.clone(),
            current: Arc::clone(&self.generation),
            generation,
        });

        let session = ConnectionSession::new(
            &self.transport,
            &self.config.working_directory,
            self.config.options(kind),
            self.config.retry.clone(),
        );

        match session.attempt_connect(sink, &cancel).await {
            Ok(client) => self.store_handle(client, &cancel),
            Err(SessionError::Cancelled) => {
                tracing::debug!(command = %kind, "Connect sequence superseded");
            }
            Err(e) => {
                tracing::info!(command = %kind, "Could not connect to service: {}", e);
                let failure = ConnectFailure::from(&e);
                let current = Arc::clone(&self.generation);
                self.dispatcher.run(move |state| {
                    if current.load(Ordering::SeqCst) == generation {
                        state.set_last_failure(Some(failure));
                    }
                });
            }
        }
    }

    /// Store a freshly connected client unless its sequence was cancelled
    fn store_handle(&self, mut client: T::Client, cancel: &CancellationToken) {
        let previous = {
            let mut slot = self.handle.lock();
            if cancel.is_cancelled() {
                drop(slot);
                tracing::debug!("Connect sequence cancelled after success, releasing client");
                release(&mut client);
                return;
            }
            slot.replace(client)
        };

        if let Some(mut previous) = previous {
            tracing::debug!("Replacing previous connection");
            release(&mut previous);
        }
    }

    /// Release the held client, if any
    fn release_handle(&self) {
        let handle = self.handle.lock().take();
        if let Some(mut client) = handle {
            if let Err(e) = client.disconnect() {
                tracing::warn!("Ignoring error during disconnect: {}", e);
            }
        }
    }
}

/// Event sink handed to the transport for one connect sequence
struct ClientSink {
    dispatcher: Dispatcher<ObservableState>,
    current: Arc<AtomicU64>,
    generation: u64,
}

impl ClientSink {
    /// Apply `update` on the consumer thread if this sink is still current
    fn apply<F>(&self, update: F)
    where
        F: FnOnce(&mut ObservableState) + Send + 'static,
    {
        let current = Arc::clone(&self.current);
        let generation = self.generation;
        self.dispatcher.run_sync(move |state| {
            if current.load(Ordering::SeqCst) == generation {
                update(state);
            } else {
                tracing::trace!(generation, "Dropping event from a stale connection");
            }
        });
    }
}

impl EventSink for ClientSink {
    fn connected(&self) {
        tracing::trace!("Service reported connected");
        self.apply(|state| {
            state.set_connected(true);
            state.set_last_failure(None);
        });
    }

    fn disconnected(&self, reason: Option<String>) {
        match reason.as_deref() {
            Some(reason) => tracing::debug!("Service reported disconnected: {}", reason),
            None => tracing::debug!("Service reported disconnected"),
        }
        self.apply(|state| state.set_connected(false));
    }

    fn write_log(&self, message: Option<String>) {
        let Some(message) = message.filter(|m| !m.is_empty()) else {
            return;
        };
        self.apply(move |state| state.push_log(message));
    }

    fn write_status(&self, message: Option<StatusMessage>) {
        self.apply(move |state| state.set_status(message));
    }

    fn write_groups(&self, groups: Option<GroupIter>) {
        let Some(groups) = groups else {
            return;
        };
        let groups: Vec<OutboundGroup> = groups.collect();
        tracing::trace!(count = groups.len(), "Received outbound groups");
        self.apply(move |state| state.set_groups(groups));
    }
}
