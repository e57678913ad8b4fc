// # Service Event Source Trait
//
// Defines the boundary to the external watch mechanism that reports
// Service additions and updates.
//
// ## Implementations
//
// - kube-runtime watcher: `extip-kube` crate
// - Channel-backed sources in tests

use k8s_openapi::api::core::v1::Service;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

/// A Service notification delivered by the watch mechanism
///
/// Both kinds are treated identically by the core: they request a
/// reconciliation pass. The payload is carried for logging only.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// A Service was seen for the first time
    Added(Arc<Service>),
    /// A known Service changed
    Updated(Arc<Service>),
}

impl ServiceEvent {
    /// Short name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceEvent::Added(_) => "add",
            ServiceEvent::Updated(_) => "update",
        }
    }

    /// The Service carried by the event
    pub fn service(&self) -> &Service {
        match self {
            ServiceEvent::Added(svc) | ServiceEvent::Updated(svc) => svc,
        }
    }
}

/// Trait for Service watch implementations
///
/// # Behavior
///
/// - The stream runs until the subscription is dropped or the source ends
/// - Deletions are not reported
/// - Must be cancellation-safe (dropping the stream unsubscribes)
pub trait ServiceEventSource: Send + Sync {
    /// Subscribe to Service notifications
    fn watch(&self) -> Pin<Box<dyn Stream<Item = ServiceEvent> + Send + 'static>>;
}
