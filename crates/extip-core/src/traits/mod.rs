//! Core traits for the extip system
//!
//! This module defines the abstract boundaries the engine depends on.
//!
//! - [`InterfaceSource`]: Read the local interface table
//! - [`ServiceStore`]: List and replace Service objects
//! - [`ServiceEventSource`]: Service add/update notifications

pub mod interface_source;
pub mod service_store;
pub mod event_source;

pub use interface_source::{InterfaceSource, NetworkInterface};
pub use service_store::ServiceStore;
pub use event_source::{ServiceEvent, ServiceEventSource};
