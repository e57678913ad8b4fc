//! Trigger coalescing
//!
//! Watch callbacks request a reconciliation pass through a [`Trigger`].
//! The request lands in a single-slot channel: if a pass is already pending,
//! further requests are no-ops. The next full scan re-derives every actual
//! change, so individual notifications need not be preserved.
//!
//! ```text
//! watch ── ServiceEvent ──► forward_events ──► Trigger::trigger()
//!                                                   │ try_send (capacity 1)
//!                                                   ▼
//!                                           PendingTrigger ──► ReconcileEngine
//! ```

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::traits::ServiceEvent;

/// Create a connected producer/consumer pair
pub fn coalescer() -> (Trigger, PendingTrigger) {
    let (tx, rx) = mpsc::channel(1);
    (Trigger { tx }, PendingTrigger { rx })
}

/// Producer side: requests a reconciliation pass without blocking
#[derive(Debug, Clone)]
pub struct Trigger {
    tx: mpsc::Sender<()>,
}

impl Trigger {
    /// Request a reconciliation pass
    ///
    /// Returns `true` if this call queued the pending signal, `false` if one
    /// was already pending (coalesced) or the worker is gone. Never blocks.
    pub fn trigger(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("Reconciliation already pending, coalescing trigger");
                false
            }
            Err(TrySendError::Closed(())) => {
                debug!("Reconciliation loop is gone, dropping trigger");
                false
            }
        }
    }
}

/// Consumer side: owned by the reconciliation loop
#[derive(Debug)]
pub struct PendingTrigger {
    rx: mpsc::Receiver<()>,
}

impl PendingTrigger {
    /// Wait for the pending signal and consume it
    ///
    /// Returns `None` once every [`Trigger`] has been dropped.
    pub async fn wait(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Consume the pending signal if set, without waiting
    pub fn take(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

/// Drain a Service notification stream into a trigger
///
/// Both additions and updates request a pass; the payload is only logged.
/// Runs until the stream ends and returns the number of events seen.
pub async fn forward_events<S>(mut events: S, trigger: Trigger) -> usize
where
    S: Stream<Item = ServiceEvent> + Unpin,
{
    let mut seen = 0;
    while let Some(event) = events.next().await {
        seen += 1;
        let svc = event.service();
        debug!(
            "re-evaluation triggered by {} of service {}/{}",
            event.kind(),
            svc.metadata.namespace.as_deref().unwrap_or_default(),
            svc.metadata.name.as_deref().unwrap_or_default()
        );
        if trigger.trigger() {
            info!("Reconciliation requested by service {}", event.kind());
        }
    }
    debug!("Service event stream ended after {} event(s)", seen);
    seen
}
