// # extip-core
//
// Core library for mirroring local interface addresses into the
// `externalIPs` of Kubernetes Services.
//
// ## Architecture Overview
//
// - **InterfaceSource**: Trait for reading the local interface table
// - **ServiceStore**: Trait for listing and replacing Services
// - **ServiceEventSource**: Trait for Service add/update notifications
// - **ReconcileEngine**: Single worker that scans interfaces and patches Services
// - **Trigger**: Single-slot, non-blocking request for a reconciliation pass
//
// ## Design Principles
//
// 1. **Single Writer**: Only the engine mutates the cache or writes Services
// 2. **Coalesced Events**: Notifications collapse into at most one pending pass
// 3. **Set Semantics**: externalIPs are compared as unordered sets
// 4. **Library-First**: Cluster and OS access live behind traits
// 5. **Eventual Consistency**: Failures are logged; the next pass recomputes

pub mod traits;
pub mod engine;
pub mod sampler;
pub mod patch;
pub mod trigger;
pub mod config;
pub mod error;
pub mod state;

// Re-export core types for convenience
pub use traits::{InterfaceSource, NetworkInterface, ServiceEvent, ServiceEventSource, ServiceStore};
pub use engine::{EngineEvent, LoopState, PassCause, ReconcileEngine, ScanReport};
pub use patch::{PatchSummary, ServiceOutcome, ServicePatcher};
pub use trigger::{PendingTrigger, Trigger, forward_events};
pub use config::{ControllerConfig, DEFAULT_ANNOTATION_KEY};
pub use error::{Error, Result};
pub use state::{InterfaceChange, InterfaceStateCache};
