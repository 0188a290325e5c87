//! Designated consumer context
//!
//! A dedicated thread owns a piece of state and runs submitted jobs against
//! it one at a time, in submission order. Every mutation of that state goes
//! through here, so readers on other threads only ever see whole updates and
//! the state itself needs no lock.

use std::fmt;
use std::io;
use std::thread::{self, ThreadId};

use tokio::sync::{mpsc, oneshot};

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Handle to a consumer thread owning a value of type `S`
///
/// Cloning the handle is cheap; the thread exits once every handle has been
/// dropped and the queue has drained.
pub struct Dispatcher<S> {
    tx: mpsc::UnboundedSender<Job<S>>,
    thread_id: ThreadId,
}

impl<S: Send + 'static> Dispatcher<S> {
    /// Spawn a named consumer thread that takes ownership of `state`
    pub fn spawn(name: &str, mut state: S) -> io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job<S>>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    job(&mut state);
                }
                tracing::trace!("Dispatcher queue closed, consumer thread exiting");
            })?;

        Ok(Self {
            tx,
            thread_id: handle.thread().id(),
        })
    }

    /// Whether the calling thread is the consumer thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queue `job` without waiting for it. Returns false if the consumer is gone.
    pub fn run<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tx.send(Box::new(job)).is_ok()
    }

    /// Run `job` on the consumer thread and block until it has finished.
    ///
    /// Called from the consumer thread itself, the job is queued behind the
    /// one currently running and this returns immediately. Returns false if
    /// the consumer is gone.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async execution context; deliver
    /// from a blocking thread (`tokio::task::spawn_blocking`) instead.
    pub fn run_sync<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        if self.is_current() {
            tracing::trace!("run_sync on the consumer thread, queueing instead");
            return self.run(job);
        }

        let (done_tx, done_rx) = oneshot::channel();
        let queued = self.run(move |state| {
            job(state);
            let _ = done_tx.send(());
        });

        queued && done_rx.blocking_recv().is_ok()
    }
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            thread_id: self.thread_id,
        }
    }
}

impl<S> fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("thread_id", &self.thread_id)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_jobs_run_in_order_on_one_thread() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::spawn("test-consumer", Vec::<u32>::new()).unwrap();

        for i in 0..100 {
            dispatcher.run(move |state| state.push(i));
        }

        let sink = Arc::clone(&seen);
        assert!(dispatcher.run_sync(move |state| {
            *sink.lock().unwrap() = state.clone();
        }));

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_run_sync_from_many_threads() {
        let dispatcher = Dispatcher::spawn("test-consumer", 0u64).unwrap();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        dispatcher.run_sync(|count| *count += 1);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let total = Arc::new(Mutex::new(0));
        let out = Arc::clone(&total);
        dispatcher.run_sync(move |count| *out.lock().unwrap() = *count);
        assert_eq!(*total.lock().unwrap(), 800);
    }

    #[test]
    fn test_jobs_run_on_the_named_thread() {
        let dispatcher = Dispatcher::spawn("tether-main", ()).unwrap();
        let name = Arc::new(Mutex::new(None));

        let out = Arc::clone(&name);
        dispatcher.run_sync(move |_| {
            *out.lock().unwrap() = std::thread::current().name().map(str::to_string);
        });

        assert_eq!(name.lock().unwrap().as_deref(), Some("tether-main"));
        assert!(!dispatcher.is_current());
    }

    #[test]
    fn test_run_sync_from_consumer_thread_does_not_deadlock() {
        let dispatcher = Dispatcher::spawn("test-consumer", Vec::<&'static str>::new()).unwrap();
        let inner = dispatcher.clone();

        dispatcher.run_sync(move |state| {
            state.push("outer");
            assert!(inner.is_current());
            inner.run_sync(|state| state.push("inner"));
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&seen);
        dispatcher.run_sync(move |state| *out.lock().unwrap() = state.clone());
        assert_eq!(*seen.lock().unwrap(), vec!["outer", "inner"]);
    }
}
