// # Interface State
//
// Last-known IPv4 address per interface, owned by the reconciliation worker.

pub mod cache;

pub use cache::{InterfaceChange, InterfaceStateCache};
