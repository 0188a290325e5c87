//! Connection session: one bounded, cancellable connect sequence
//!
//! A session opens a transport client and drives it through the retry
//! schedule until an attempt succeeds, the budget runs out, or the
//! sequence is cancelled. Any client that is not handed back to the caller
//! is released before returning.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use tether_core::config::RetryPolicy;
use tether_core::{ClientOptions, CommandTransport, EventSink, TransportClient, TransportError};

use crate::backoff::LinearBackoff;

/// Why a connect sequence ended without a handle
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport could not construct a client
    #[error("Failed to open transport client: {0}")]
    Open(#[source] TransportError),

    /// The sequence was cancelled by a newer connect or a disconnect
    #[error("Connect sequence cancelled")]
    Cancelled,

    /// Every attempt failed
    #[error("Gave up after {attempts} attempts{}", last_error_suffix(.last_error))]
    Exhausted {
        attempts: u32,
        last_error: Option<TransportError>,
    },
}

fn last_error_suffix(last_error: &Option<TransportError>) -> String {
    match last_error {
        Some(e) => format!(": {}", e),
        None => String::new(),
    }
}

/// Drives a single connect sequence against a transport
pub struct ConnectionSession<'a, T: CommandTransport> {
    /// Transport used to open the client
    transport: &'a T,
    /// Service working directory the client is bound to
    working_directory: &'a Path,
    /// Subscription and status interval sent at handshake
    options: ClientOptions,
    /// Retry schedule
    policy: RetryPolicy,
}

impl<'a, T: CommandTransport> ConnectionSession<'a, T> {
    /// Create a new session
    pub fn new(
        transport: &'a T,
        working_directory: &'a Path,
        options: ClientOptions,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            working_directory,
            options,
            policy,
        }
    }

    /// Open a client and try to connect it, honoring `cancel`.
    ///
    /// Cancellation is checked right after each backoff sleep and right
    /// after each attempt; an attempt already in flight is never preempted.
    pub async fn attempt_connect(
        &self,
        sink: Arc<dyn EventSink>,
        cancel: &CancellationToken,
    ) -> Result<T::Client, SessionError> {
        let mut client = self
            .transport
            .new_client(self.working_directory, sink, self.options)
            .map_err(SessionError::Open)?;

        let mut backoff = LinearBackoff::from_policy(self.policy.clone());
        let mut last_error = None;

        while let Some(delay) = backoff.next_delay() {
            let attempt = backoff.attempts();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }

            if cancel.is_cancelled() {
                tracing::debug!(attempt, "Connect sequence cancelled during backoff");
                release(&mut client);
                return Err(SessionError::Cancelled);
            }

            let result = client.connect().await;

            if cancel.is_cancelled() {
                tracing::debug!(attempt, "Connect sequence cancelled after attempt");
                release(&mut client);
                return Err(SessionError::Cancelled);
            }

            match result {
                Ok(()) => {
                    tracing::info!(
                        attempt,
                        command = %self.options.command,
                        "Connected to service at {:?}",
                        self.working_directory
                    );
                    return Ok(client);
                }
                Err(e) => {
                    tracing::debug!(
                        attempt,
                        remaining = backoff.remaining(),
                        "Connect attempt failed: {}",
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        release(&mut client);
        Err(SessionError::Exhausted {
            attempts: backoff.attempts(),
            last_error,
        })
    }
}

/// Release a client that will not be handed out; errors are only logged
pub(crate) fn release<C: TransportClient>(client: &mut C) {
    if let Err(e) = client.disconnect() {
        tracing::debug!("Ignoring error while releasing transport client: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;
    use tether_core::{GroupIter, StatusMessage, SubscriptionKind};
    use tokio::time::Instant;

    struct NullSink;

    impl EventSink for NullSink {
        fn connected(&self) {}
        fn disconnected(&self, _reason: Option<String>) {}
        fn write_log(&self, _message: Option<String>) {}
        fn write_status(&self, _message: Option<StatusMessage>) {}
        fn write_groups(&self, _groups: Option<GroupIter>) {}
    }

    #[derive(Default)]
    struct Counters {
        connect_calls: AtomicU32,
        released: AtomicBool,
    }

    /// Fails every attempt before `succeed_on` (1-based)
    struct FlakyTransport {
        succeed_on: Option<u32>,
        counters: Arc<Counters>,
        cancel_on_attempt: Option<(u32, CancellationToken)>,
    }

    struct FlakyClient {
        succeed_on: Option<u32>,
        counters: Arc<Counters>,
        cancel_on_attempt: Option<(u32, CancellationToken)>,
    }

    #[async_trait]
    impl TransportClient for FlakyClient {
        async fn connect(&mut self) -> Result<(), TransportError> {
            let call = self.counters.connect_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((on, token)) = &self.cancel_on_attempt {
                if *on == call {
                    token.cancel();
                }
            }
            if Some(call) == self.succeed_on {
                Ok(())
            } else {
                Err(TransportError::Handshake("service not listening".to_string()))
            }
        }

        fn disconnect(&mut self) -> Result<(), TransportError> {
            self.counters.released.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    impl CommandTransport for FlakyTransport {
        type Client = FlakyClient;

        fn new_client(
            &self,
            _working_directory: &Path,
            _sink: Arc<dyn EventSink>,
            _options: ClientOptions,
        ) -> Result<FlakyClient, TransportError> {
            Ok(FlakyClient {
                succeed_on: self.succeed_on,
                counters: Arc::clone(&self.counters),
                cancel_on_attempt: self.cancel_on_attempt.clone(),
            })
        }
    }

    fn transport(succeed_on: Option<u32>) -> FlakyTransport {
        FlakyTransport {
            succeed_on,
            counters: Arc::new(Counters::default()),
            cancel_on_attempt: None,
        }
    }

    async fn run(
        transport: &FlakyTransport,
        cancel: &CancellationToken,
    ) -> Result<FlakyClient, SessionError> {
        let dir = Path::new("/tmp/tether-test");
        let session = ConnectionSession::new(
            transport,
            dir,
            ClientOptions::new(SubscriptionKind::Status),
            RetryPolicy::default(),
        );
        session.attempt_connect(Arc::new(NullSink), cancel).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_last_attempt() {
        let transport = transport(Some(10));
        let start = Instant::now();

        let result = run(&transport, &CancellationToken::new()).await;

        assert!(result.is_ok());
        assert_eq!(transport.counters.connect_calls.load(Ordering::SeqCst), 10);
        assert!(!transport.counters.released.load(Ordering::SeqCst));
        assert!(start.elapsed() >= Duration::from_millis(3250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_success() {
        let transport = transport(Some(1));
        let start = Instant::now();

        let result = run(&transport, &CancellationToken::new()).await;

        assert!(result.is_ok());
        assert_eq!(transport.counters.connect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_releases_client() {
        let transport = transport(None);

        let result = run(&transport, &CancellationToken::new()).await;

        match result {
            Err(SessionError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 10);
                assert!(last_error.is_some());
            }
            Err(other) => panic!("Expected Exhausted, got {:?}", other),
            Ok(_) => panic!("Expected Exhausted, got a client"),
        }
        assert_eq!(transport.counters.connect_calls.load(Ordering::SeqCst), 10);
        assert!(transport.counters.released.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_attempt() {
        let transport = transport(Some(1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run(&transport, &cancel).await;

        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert_eq!(transport.counters.connect_calls.load(Ordering::SeqCst), 0);
        assert!(transport.counters.released.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retrying() {
        let transport = transport(None);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            // Attempts land at 100ms and 250ms; cancel inside the third sleep.
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = run(&transport, &cancel).await;

        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert_eq!(transport.counters.connect_calls.load(Ordering::SeqCst), 2);
        assert!(transport.counters.released.load(Ordering::SeqCst));
        assert!(start.elapsed() < Duration::from_millis(450));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_cancel_is_released() {
        let cancel = CancellationToken::new();
        let transport = FlakyTransport {
            succeed_on: Some(3),
            counters: Arc::new(Counters::default()),
            cancel_on_attempt: Some((3, cancel.clone())),
        };

        let result = run(&transport, &cancel).await;

        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert_eq!(transport.counters.connect_calls.load(Ordering::SeqCst), 3);
        assert!(transport.counters.released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_exhausted_message_includes_last_error() {
        let err = SessionError::Exhausted {
            attempts: 10,
            last_error: Some(TransportError::Closed),
        };
        assert_eq!(err.to_string(), "Gave up after 10 attempts: Connection closed");

        let err = SessionError::Exhausted {
            attempts: 0,
            last_error: None,
        };
        assert_eq!(err.to_string(), "Gave up after 0 attempts");
    }
}
