// # Service Store Trait
//
// Defines the cluster read/write boundary for Service objects.
//
// ## Implementations
//
// - Kubernetes API: `extip-kube` crate
// - Counting in-memory stores in tests

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;

/// Trait for cluster-side Service access
///
/// # Trust Level: Untrusted
///
/// Stores are thin adapters over the cluster API:
///
/// ## Allowed Capabilities
/// - ✅ One API call per invocation
/// - ✅ Return success or failure (the next pass is the retry)
///
/// ## Forbidden Capabilities
/// - ❌ Filtering by annotation (owned by `ServicePatcher`)
/// - ❌ Deciding whether a write is needed (owned by `ServicePatcher`)
/// - ❌ Retry loops or backoff (the engine re-derives everything next pass)
/// - ❌ Partial or merge patches (writes are whole-object replaces)
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// List every Service across all namespaces
    ///
    /// No server-side filtering is applied.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Service>)`: All services
    /// - `Err(Error::List)`: If the listing failed
    async fn list_services(&self) -> Result<Vec<Service>, crate::Error>;

    /// Replace a Service with the given object
    ///
    /// The object's namespace and name identify the target. The caller has
    /// already rewritten `spec.externalIPs`.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The write was accepted
    /// - `Err(Error::Update)`: If the write failed
    async fn replace_service(&self, service: &Service) -> Result<(), crate::Error>;

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}
