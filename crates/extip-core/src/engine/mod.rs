//! Reconciliation engine
//!
//! The ReconcileEngine is responsible for:
//! - Scanning local interfaces and detecting address changes
//! - Patching annotated Services for each change
//! - Scheduling passes on a periodic timer and on coalesced triggers
//!
//! ## Architecture
//!
//! ```text
//!  watch notifications          periodic timer
//!          │                          │
//!          ▼                          │
//! ┌─────────────────┐                 │
//! │ Trigger (cap 1) │                 │
//! └─────────────────┘                 │
//!          │                          │
//!          └────────────┬─────────────┘
//!                       ▼
//!             ┌──────────────────┐
//!             │ ReconcileEngine  │──── EngineEvent ───► monitoring
//!             └──────────────────┘
//!                       │
//!        ┌──────────────┼────────────────┐
//!        ▼              ▼                ▼
//! ┌─────────────┐ ┌──────────────┐ ┌──────────────┐
//! │ Interface   │ │ Interface    │ │ Service      │
//! │ Source      │ │ StateCache   │ │ Patcher      │
//! └─────────────┘ └──────────────┘ └──────────────┘
//! ```
//!
//! ## Pass Flow
//!
//! 1. Enumerate local interfaces
//! 2. Sample each interface's IPv4 address (failures skip the interface)
//! 3. Compare with the cache; on a difference, record it
//! 4. Patch Services annotated with that interface before moving on
//! 5. Interfaces whose last patch failed are patched again even without a
//!    new difference, withdrawing every address they may have left behind
//!
//! ## Loop States
//!
//! `Waiting` → `Running` on a timer tick or pending trigger, back to
//! `Waiting` when the pass returns, `Terminated` once the stop signal is
//! observed while waiting. A pass in flight is never interrupted.

use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::error::Result;
use crate::patch::{ServiceOutcome, ServicePatcher};
use crate::sampler::sample_ipv4;
use crate::state::{InterfaceChange, InterfaceStateCache};
use crate::traits::{InterfaceSource, ServiceStore};
use crate::trigger::{self, PendingTrigger, Trigger};

/// Why a reconciliation pass ran
///
/// Every cause runs the identical pass; this is carried for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassCause {
    /// Immediate pass when the loop starts
    Startup,
    /// Periodic resync timer
    Timer,
    /// Coalesced watch notification
    Trigger,
    /// Direct call to [`ReconcileEngine::reconcile_once`]
    Manual,
}

/// Reconciliation loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Idle, waiting for a timer tick, trigger or stop signal
    Waiting,
    /// A pass is in flight
    Running,
    /// The stop signal was observed
    Terminated,
}

/// Events emitted by the ReconcileEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started { resync_interval_secs: u64 },

    /// Reconciliation pass started
    PassStarted { cause: PassCause },

    /// An interface address differs from the cached one
    InterfaceChanged {
        interface: String,
        old_ip: Option<Ipv4Addr>,
        new_ip: Ipv4Addr,
    },

    /// An interface could not be sampled this pass
    SampleFailed { interface: String, error: String },

    /// Service listing failed while handling a change
    ListFailed { interface: String, error: String },

    /// A Service's externalIPs were replaced
    ServicePatched {
        namespace: String,
        name: String,
        external_ips: Vec<String>,
    },

    /// A matched Service already had the target set
    ServiceUnchanged { namespace: String, name: String },

    /// Writing a Service failed
    ServicePatchFailed {
        namespace: String,
        name: String,
        error: String,
    },

    /// Reconciliation pass finished
    PassCompleted {
        changes: usize,
        patched: usize,
        failed: usize,
    },

    /// Engine stopped
    Stopped { reason: String },
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Changes detected, in interface enumeration order
    pub changes: Vec<InterfaceChange>,
    /// Interfaces skipped because sampling failed
    pub sample_failures: usize,
    /// Unsettled interfaces patched again without a new difference
    pub retries: usize,
    /// Changes whose Service listing failed
    pub list_failures: usize,
    /// Services written
    pub patched: usize,
    /// Matched Services that needed no write
    pub unchanged: usize,
    /// Service writes that failed
    pub failed: usize,
}

/// Core reconciliation engine
///
/// The engine is the single worker that owns the interface cache and issues
/// Service writes. Watch callbacks only reach it through a [`Trigger`].
///
/// ## Lifecycle
///
/// 1. Create with [`ReconcileEngine::new()`]
/// 2. Hand [`ReconcileEngine::trigger()`] clones to event sources
/// 3. Start with [`ReconcileEngine::run()`] or [`ReconcileEngine::run_until()`]
/// 4. Engine runs until the stop signal is observed between passes
///
/// ## Concurrency
///
/// Passes run strictly one after another on the task driving the loop.
/// Slow cluster calls delay the next pass; they never overlap with it.
pub struct ReconcileEngine {
    /// Local interface table
    interfaces: Box<dyn InterfaceSource>,

    /// Service diff and write logic
    patcher: ServicePatcher,

    /// Last-known address per interface
    cache: InterfaceStateCache,

    /// Periodic resync interval
    resync_interval: Duration,

    /// Producer handle, cloned out to event sources
    trigger: Trigger,

    /// Single-slot pending signal
    pending: PendingTrigger,

    /// Current loop state
    state: LoopState,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconcileEngine {
    /// Create a new reconciliation engine
    ///
    /// # Parameters
    ///
    /// - `interfaces`: Interface table implementation
    /// - `services`: Service store implementation
    /// - `config`: Controller configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        interfaces: Box<dyn InterfaceSource>,
        services: Box<dyn ServiceStore>,
        config: ControllerConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (trigger, pending) = trigger::coalescer();

        let engine = Self {
            interfaces,
            patcher: ServicePatcher::new(services, config.annotation_key.clone(), config.api_timeout()),
            cache: InterfaceStateCache::new(),
            resync_interval: config.resync_interval(),
            trigger,
            pending,
            state: LoopState::Waiting,
            event_tx,
        };

        Ok((engine, event_rx))
    }

    /// A producer handle for requesting passes
    pub fn trigger(&self) -> Trigger {
        self.trigger.clone()
    }

    /// Current loop state
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Last-known interface addresses
    pub fn cache(&self) -> &InterfaceStateCache {
        &self.cache
    }

    /// Run the engine until Ctrl-C
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run the engine until `shutdown` resolves
    ///
    /// The first pass starts immediately. The stop signal is only checked
    /// while waiting, so a pass that already started always completes.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        self.emit_event(EngineEvent::Started {
            resync_interval_secs: self.resync_interval.as_secs(),
        });
        info!(
            "Reconciliation loop started (resync every {:?}, interfaces: {}, services: {})",
            self.resync_interval,
            self.interfaces.source_name(),
            self.patcher.store_name()
        );

        let mut ticker = tokio::time::interval(self.resync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut first_tick = true;

        loop {
            self.state = LoopState::Waiting;

            let cause = tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = ticker.tick() => {
                    if std::mem::take(&mut first_tick) {
                        PassCause::Startup
                    } else {
                        PassCause::Timer
                    }
                }

                Some(()) = self.pending.wait() => PassCause::Trigger,
            };

            self.state = LoopState::Running;
            self.reconcile_once(cause).await;
        }

        self.state = LoopState::Terminated;
        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        info!("Reconciliation loop stopped");

        Ok(())
    }

    /// Run one full scan-and-patch pass
    pub async fn reconcile_once(&mut self, cause: PassCause) -> ScanReport {
        debug!("Reconciliation pass started ({:?})", cause);
        self.emit_event(EngineEvent::PassStarted { cause });

        let report = self.scan_and_detect_changes().await;

        self.emit_event(EngineEvent::PassCompleted {
            changes: report.changes.len(),
            patched: report.patched,
            failed: report.failed + report.list_failures,
        });
        debug!(
            "Reconciliation pass finished: {} change(s), {} patched, {} failed",
            report.changes.len(),
            report.patched,
            report.failed
        );

        report
    }

    /// Sample every interface and patch Services for each change
    ///
    /// Each change is handed to the patcher before the next interface is
    /// sampled. The cache always keeps the new address. If patching fails
    /// (listing or any write), the interface stays unsettled: later passes
    /// patch it again and withdraw every address it may have left behind.
    pub async fn scan_and_detect_changes(&mut self) -> ScanReport {
        let mut report = ScanReport::default();

        let names: Vec<String> = match self.interfaces.interfaces() {
            Ok(interfaces) => interfaces.into_iter().map(|iface| iface.name).collect(),
            Err(e) => {
                error!("Error getting interfaces: {}", e);
                return report;
            }
        };

        for name in names {
            let Some(ip) = self.sample(&name, &mut report) else {
                continue;
            };

            let (change, is_retry) = match self.cache.observe(&name, ip) {
                Some(change) => {
                    info!("IP changed for {}", change);
                    self.emit_event(EngineEvent::InterfaceChanged {
                        interface: change.interface.clone(),
                        old_ip: change.old_ip,
                        new_ip: change.new_ip,
                    });
                    (change, false)
                }
                None => match self.cache.retry(&name) {
                    Some(change) => {
                        info!(
                            "Retrying services for [{}] at [{}]",
                            change.interface, change.new_ip
                        );
                        (change, true)
                    }
                    None => continue,
                },
            };

            if self.patch_services(&change, &mut report).await {
                self.cache.settle(&change.interface);
            } else {
                warn!(
                    "Services for [{}] not fully reconciled, will retry on next pass",
                    change.interface
                );
                self.cache.unsettle(&change);
            }

            if is_retry {
                report.retries += 1;
            } else {
                report.changes.push(change);
            }
        }

        report
    }

    /// Sample one interface, recording a failure in the report
    fn sample(&self, name: &str, report: &mut ScanReport) -> Option<Ipv4Addr> {
        match sample_ipv4(self.interfaces.as_ref(), name) {
            Ok(ip) => Some(ip),
            Err(e) => {
                debug!("Skipping interface {}: {}", name, e);
                report.sample_failures += 1;
                self.emit_event(EngineEvent::SampleFailed {
                    interface: name.to_string(),
                    error: e.to_string(),
                });
                None
            }
        }
    }

    /// Patch Services for one change, returns `false` on any failure
    async fn patch_services(&self, change: &InterfaceChange, report: &mut ScanReport) -> bool {
        let summary = match self.patcher.reconcile_interface(change).await {
            Ok(summary) => summary,
            Err(e) => {
                report.list_failures += 1;
                self.emit_event(EngineEvent::ListFailed {
                    interface: change.interface.clone(),
                    error: e.to_string(),
                });
                return false;
            }
        };

        report.patched += summary.patched();
        report.unchanged += summary.unchanged();
        report.failed += summary.failed();

        for outcome in &summary.outcomes {
            let event = match outcome.clone() {
                ServiceOutcome::Patched {
                    namespace,
                    name,
                    external_ips,
                } => EngineEvent::ServicePatched {
                    namespace,
                    name,
                    external_ips,
                },
                ServiceOutcome::Unchanged { namespace, name } => {
                    EngineEvent::ServiceUnchanged { namespace, name }
                }
                ServiceOutcome::Failed {
                    namespace,
                    name,
                    error,
                } => EngineEvent::ServicePatchFailed {
                    namespace,
                    name,
                    error,
                },
            };
            self.emit_event(event);
        }

        summary.failed() == 0
    }

    /// Emit an engine event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Test-only helper to run the engine with a controlled shutdown signal
    ///
    /// With `None` this behaves like [`ReconcileEngine::run()`]. Dropping
    /// the sender counts as a shutdown signal.
    pub async fn run_with_shutdown(
        &mut self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        match shutdown_rx {
            Some(rx) => {
                self.run_until(async {
                    let _ = rx.await;
                })
                .await
            }
            None => self.run().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_equality() {
        let event = EngineEvent::InterfaceChanged {
            interface: "eth0".to_string(),
            old_ip: None,
            new_ip: Ipv4Addr::new(10, 0, 0, 5),
        };

        assert_eq!(event.clone(), event);
    }

    #[test]
    fn empty_report_has_no_changes() {
        let report = ScanReport::default();
        assert!(report.changes.is_empty());
        assert_eq!(report.patched + report.failed + report.list_failures, 0);
    }
}
