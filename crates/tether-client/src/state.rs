//! Observable client state
//!
//! [`ObservableState`] is the write side and lives on the consumer thread;
//! [`StateView`] is the read side and can be cloned to any thread. Each
//! field is a `watch` channel, so observers can either read the latest value
//! or await changes.

use std::collections::VecDeque;
use std::fmt;

use tokio::sync::watch;

use tether_core::{OutboundGroup, StatusMessage};

use crate::session::SessionError;

/// Why the most recent connect sequence ended without a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectFailure {
    /// Attempts made before giving up
    pub attempts: u32,
    /// Human-readable cause
    pub reason: String,
}

impl From<&SessionError> for ConnectFailure {
    fn from(err: &SessionError) -> Self {
        let attempts = match err {
            SessionError::Exhausted { attempts, .. } => *attempts,
            SessionError::Open(_) | SessionError::Cancelled => 0,
        };
        Self {
            attempts,
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Bounded log lines plus a count of every line ever appended
///
/// The count keeps growing after eviction starts, so an observer that
/// remembers the count it last saw can tell which buffered lines are new even
/// when the messages repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    appended: u64,
}

impl LogBuffer {
    /// Buffered lines, oldest first
    pub fn lines(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }

    /// Number of buffered lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether no lines are buffered
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total lines appended so far, including evicted ones
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Buffered lines appended after the first `seen` lines
    ///
    /// Lines that were already evicted are skipped.
    pub fn since(&self, seen: u64) -> impl Iterator<Item = &String> {
        let unseen = self.appended.saturating_sub(seen);
        let unseen = usize::try_from(unseen).unwrap_or(usize::MAX).min(self.lines.len());
        self.lines.iter().skip(self.lines.len() - unseen)
    }

    fn push(&mut self, message: String, max: usize) {
        while self.lines.len() >= max {
            self.lines.pop_front();
        }
        self.lines.push_back(message);
        self.appended += 1;
    }
}

/// Write side of the observable fields
pub struct ObservableState {
    log_max_lines: usize,
    is_connected: watch::Sender<bool>,
    status: watch::Sender<Option<StatusMessage>>,
    groups: watch::Sender<Option<Vec<OutboundGroup>>>,
    log_list: watch::Sender<LogBuffer>,
    last_failure: watch::Sender<Option<ConnectFailure>>,
}

/// Read side of the observable fields
#[derive(Clone)]
pub struct StateView {
    is_connected: watch::Receiver<bool>,
    status: watch::Receiver<Option<StatusMessage>>,
    groups: watch::Receiver<Option<Vec<OutboundGroup>>>,
    log_list: watch::Receiver<LogBuffer>,
    last_failure: watch::Receiver<Option<ConnectFailure>>,
}

/// Create an empty state holding at most `log_max_lines` log lines
pub fn observable_state(log_max_lines: usize) -> (ObservableState, StateView) {
    let (is_connected, is_connected_rx) = watch::channel(false);
    let (status, status_rx) = watch::channel(None);
    let (groups, groups_rx) = watch::channel(None);
    let (log_list, log_list_rx) = watch::channel(LogBuffer::default());
    let (last_failure, last_failure_rx) = watch::channel(None);

    let state = ObservableState {
        log_max_lines,
        is_connected,
        status,
        groups,
        log_list,
        last_failure,
    };
    let view = StateView {
        is_connected: is_connected_rx,
        status: status_rx,
        groups: groups_rx,
        log_list: log_list_rx,
        last_failure: last_failure_rx,
    };
    (state, view)
}

impl ObservableState {
    /// Update the connectivity flag, notifying only on change
    pub fn set_connected(&mut self, connected: bool) {
        self.is_connected.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    /// Replace the latest status
    pub fn set_status(&mut self, status: Option<StatusMessage>) {
        self.status.send_replace(status);
    }

    /// Replace the latest group list
    pub fn set_groups(&mut self, groups: Vec<OutboundGroup>) {
        self.groups.send_replace(Some(groups));
    }

    /// Append a log line, evicting the oldest lines beyond the limit
    pub fn push_log(&mut self, message: String) {
        let max = self.log_max_lines;
        if max == 0 {
            return;
        }

        self.log_list.send_modify(|buffer| buffer.push(message, max));
    }

    /// Record (or clear) the diagnostic for the last connect sequence
    pub fn set_last_failure(&mut self, failure: Option<ConnectFailure>) {
        self.last_failure.send_replace(failure);
    }
}

impl StateView {
    /// Whether the service reported the subscription as established
    pub fn is_connected(&self) -> bool {
        *self.is_connected.borrow()
    }

    /// Latest status snapshot
    pub fn status(&self) -> Option<StatusMessage> {
        self.status.borrow().clone()
    }

    /// Latest group list
    pub fn groups(&self) -> Option<Vec<OutboundGroup>> {
        self.groups.borrow().clone()
    }

    /// Buffered log lines, oldest first
    pub fn log_list(&self) -> Vec<String> {
        self.log_list.borrow().lines().cloned().collect()
    }

    /// Why the last connect sequence gave up, if it did
    pub fn last_failure(&self) -> Option<ConnectFailure> {
        self.last_failure.borrow().clone()
    }

    /// Subscribe to connectivity changes
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.is_connected.clone()
    }

    /// Subscribe to status changes
    pub fn watch_status(&self) -> watch::Receiver<Option<StatusMessage>> {
        self.status.clone()
    }

    /// Subscribe to group list changes
    pub fn watch_groups(&self) -> watch::Receiver<Option<Vec<OutboundGroup>>> {
        self.groups.clone()
    }

    /// Subscribe to log buffer changes
    pub fn watch_log(&self) -> watch::Receiver<LogBuffer> {
        self.log_list.clone()
    }

    /// Subscribe to connect failure diagnostics
    pub fn watch_last_failure(&self) -> watch::Receiver<Option<ConnectFailure>> {
        self.last_failure.clone()
    }
}

impl fmt::Debug for StateView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateView")
            .field("is_connected", &self.is_connected())
            .field("has_status", &self.status.borrow().is_some())
            .field("groups", &self.groups.borrow().as_ref().map(Vec::len))
            .field("log_lines", &self.log_list.borrow().len())
            .finish()
    }
}
