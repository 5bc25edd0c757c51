//! Graceful shutdown coordination.
//!
//! [`ShutdownSignal`] is a latched stop flag shared by every clone;
//! [`ConnectionTracker`] counts in-flight connections so the accept loop can
//! drain before exiting.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{watch, Notify};
use tracing::info;

/// A cloneable, latched signal used to trigger and await shutdown.
///
/// Backed by a watch channel holding a single "stopped" flag, so all clones
/// observe the same trigger and late subscribers resolve immediately.
/// Triggering more than once is a no-op.
///
/// # Example
///
/// ```rust
/// use wicket_server::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// let observer = shutdown.clone();
///
/// shutdown.trigger();
/// assert!(observer.is_shutdown());
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    stopped: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            stopped: Arc::new(stopped),
        }
    }

    /// Trigger the signal, waking all waiters. Idempotent.
    pub fn trigger(&self) {
        self.stopped.send_replace(true);
    }

    /// Check whether shutdown has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Get a future that resolves when shutdown is triggered.
    ///
    /// Resolves immediately if the signal was already triggered.
    pub fn recv(&self) -> ShutdownReceiver {
        let mut receiver = self.stopped.subscribe();
        ShutdownReceiver {
            // wait_for checks the current value before suspending, so a
            // trigger that races this subscription is never missed. A closed
            // channel means the signal is gone entirely; treat it as stopped.
            inner: Box::pin(async move {
                let _ = receiver.wait_for(|stopped| *stopped).await;
            }),
        }
    }

    /// Create a signal that triggers on SIGTERM or SIGINT.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if the OS signal handlers cannot be registered.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            wait_for_os_signal().await;
            trigger.trigger();
        });

        signal
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`ShutdownSignal::recv`].
pub struct ShutdownReceiver {
    inner: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl Future for ShutdownReceiver {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to wait for Ctrl+C");
        info!("received Ctrl+C, shutting down");
    }
}

/// Counts live connections for the shutdown drain.
///
/// Each accepted connection holds a [`ConnectionToken`]; when the last token
/// drops, [`wait_for_drain`](Self::wait_for_drain) resolves.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    active: AtomicUsize,
    drained: Notify,
}

impl ConnectionTracker {
    /// Create a tracker with no active connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a token for one connection.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Get the number of active connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Wait until every token has been dropped.
    pub async fn wait_for_drain(&self) {
        while self.inner.active.load(Ordering::SeqCst) > 0 {
            self.inner.drained.notified().await;
        }
    }
}

/// Token held for the lifetime of one connection.
#[derive(Debug)]
pub struct ConnectionToken {
    inner: Arc<TrackerInner>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}
