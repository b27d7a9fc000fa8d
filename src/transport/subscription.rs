//! Cancellable forwarding of capability streams.
//!
//! A [`Subscription`] owns a spawned task that drains a stream and forwards
//! each item into the bridge event loop, tagged with the subscription's ID.
//! Dropping or cancelling the subscription aborts the task.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::identifiers::SubscriptionId;

// ============================================================================
// Subscription
// ============================================================================

/// Handle to a spawned forwarding task.
pub struct Subscription {
    /// Tag carried by every forwarded event.
    id: SubscriptionId,
    /// Short name for logs.
    label: &'static str,
    /// The spawned task.
    handle: JoinHandle<()>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Spawns a task built from a freshly allocated ID.
    pub fn spawn<F, Fut>(label: &'static str, task: F) -> Self
    where
        F: FnOnce(SubscriptionId) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = SubscriptionId::next();
        let handle = tokio::spawn(task(id));
        trace!(%id, label, "Subscription started");
        Self { id, label, handle }
    }

    /// Forwards every stream item into `events`.
    ///
    /// `map` receives `Some(item)` per item and `None` once when the stream
    /// ends. Forwarding stops early if the receiver is gone.
    pub fn forward<S, T, E, M>(
        label: &'static str,
        stream: S,
        events: mpsc::UnboundedSender<E>,
        map: M,
    ) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        M: Fn(SubscriptionId, Option<T>) -> E + Send + 'static,
    {
        Self::spawn(label, move |id| async move {
            let mut stream = Box::pin(stream);
            while let Some(item) = stream.next().await {
                if events.send(map(id, Some(item))).is_err() {
                    return;
                }
            }
            let _ = events.send(map(id, None));
        })
    }

    /// Returns the subscription ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the log label.
    #[inline]
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Cancels the task.
    #[inline]
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            trace!(id = %self.id, label = self.label, "Subscription cancelled");
        }
        self.handle.abort();
    }
}

// ============================================================================
// Tests
// ============================================================================
