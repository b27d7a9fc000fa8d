//! Auto-close countdown.
//!
//! While the device is unreachable (`NOT_CONNECTED`) or locked (`LOCKED`),
//! a countdown runs. It publishes the whole seconds remaining on every tick
//! and, on reaching zero, asks the event loop to close the bridge.
//!
//! One spawned deadline task is the only source of remaining time. Ticks
//! and expiry travel through the event loop tagged with the task's
//! subscription ID, so nothing from a disarmed countdown is ever acted on.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, trace};

use crate::identifiers::SubscriptionId;
use crate::status::{Countdown, StatusEvent, StatusSink};
use crate::transport::{DeviceStatus, Subscription};

use super::context::BridgeEvent;

// ============================================================================
// Armed
// ============================================================================

/// A running countdown.
#[derive(Debug)]
struct Armed {
    /// Status that armed the countdown, reported on expiry.
    status: DeviceStatus,
    /// The deadline task.
    task: Subscription,
}

// ============================================================================
// AutoCloseGovernor
// ============================================================================

/// Arms, disarms and tracks the auto-close countdown.
pub(crate) struct AutoCloseGovernor {
    /// Countdown length.
    timeout: Duration,
    /// Publishing interval.
    tick: Duration,
    /// Where countdown values go.
    status: Arc<dyn StatusSink>,
    /// Event loop input.
    events: mpsc::UnboundedSender<BridgeEvent>,
    /// Running countdown, if armed.
    armed: Option<Armed>,
}

impl std::fmt::Debug for AutoCloseGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoCloseGovernor")
            .field("timeout", &self.timeout)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

impl AutoCloseGovernor {
    /// Creates a disarmed governor.
    pub(crate) fn new(
        timeout: Duration,
        tick: Duration,
        status: Arc<dyn StatusSink>,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self {
            timeout,
            tick,
            status,
            events,
            armed: None,
        }
    }

    /// Returns `true` while a countdown is running.
    #[inline]
    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Starts the countdown for `status`. No-op while already armed.
    pub(crate) fn arm(&mut self, status: DeviceStatus) {
        if self.is_armed() {
            trace!(%status, "Auto-close already armed");
            return;
        }

        let timeout = self.timeout;
        let tick = self.tick;
        let events = self.events.clone();
        let task = Subscription::spawn("auto-close", move |id| {
            run_countdown(id, timeout, tick, events)
        });

        debug!(%status, seconds = timeout.as_secs(), "Auto-close armed");
        self.status
            .publish(StatusEvent::TimeLeft(Countdown::Remaining(timeout.as_secs())));
        self.armed = Some(Armed { status, task });
    }

    /// Cancels the countdown and publishes the inactive sentinel.
    pub(crate) fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            debug!(status = %armed.status, "Auto-close disarmed");
        }
        self.status.publish(StatusEvent::TimeLeft(Countdown::Inactive));
    }

    /// Publishes a tick if it belongs to the running countdown.
    pub(crate) fn on_tick(&self, id: SubscriptionId, remaining: u64) {
        if self.is_current(id) {
            self.status
                .publish(StatusEvent::TimeLeft(Countdown::Remaining(remaining)));
        } else {
            trace!(%id, "Dropping stale countdown tick");
        }
    }

    /// Consumes the countdown on expiry.
    ///
    /// Returns the status that armed it, or `None` for a stale expiry.
    pub(crate) fn expire(&mut self, id: SubscriptionId) -> Option<DeviceStatus> {
        if !self.is_current(id) {
            trace!(%id, "Dropping stale countdown expiry");
            return None;
        }
        let armed = self.armed.take()?;
        self.status
            .publish(StatusEvent::TimeLeft(Countdown::Remaining(0)));
        Some(armed.status)
    }

    fn is_current(&self, id: SubscriptionId) -> bool {
        self.armed.as_ref().is_some_and(|armed| armed.task.id() == id)
    }
}

// ============================================================================
// Countdown Task
// ============================================================================

/// Deadline task: one tick event per interval, one expiry event at the end.
async fn run_countdown(
    id: SubscriptionId,
    timeout: Duration,
    tick: Duration,
    events: mpsc::UnboundedSender<BridgeEvent>,
) {
    let start = Instant::now();
    let deadline = start + timeout;
    let mut ticker = interval_at(start + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            () = sleep_until(deadline) => {
                let _ = events.send(BridgeEvent::AutoCloseExpired { id });
                return;
            }

            now = ticker.tick() => {
                let remaining = deadline.saturating_duration_since(now).as_secs();
                if remaining > 0
                    && events.send(BridgeEvent::CountdownTick { id, remaining }).is_err()
                {
                    return;
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
