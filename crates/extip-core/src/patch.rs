//! Service patching
//!
//! Given one interface change, rewrites the `externalIPs` of every Service
//! annotated with that interface: the old address (and any address left
//! behind by an earlier failed pass) is removed, the new one added, anything
//! else (addresses from other sources) preserved.
//!
//! ## Write Policy
//!
//! The current and target lists are compared as unordered sets. Order and
//! duplicates never cause a write, which keeps repeated passes idempotent
//! even if the API server reorders the list.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::Service;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::state::InterfaceChange;
use crate::traits::ServiceStore;

/// Outcome for one matched Service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    /// The externalIPs were replaced
    Patched {
        namespace: String,
        name: String,
        external_ips: Vec<String>,
    },
    /// The target set equals the current set, nothing written
    Unchanged { namespace: String, name: String },
    /// The write was rejected or timed out
    Failed {
        namespace: String,
        name: String,
        error: String,
    },
}

/// Result of reconciling one interface change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSummary {
    /// Per-Service outcomes, in listing order
    pub outcomes: Vec<ServiceOutcome>,
}

impl PatchSummary {
    /// Services whose annotation matched the interface
    pub fn matched(&self) -> usize {
        self.outcomes.len()
    }

    /// Services written successfully
    pub fn patched(&self) -> usize {
        self.count(|o| matches!(o, ServiceOutcome::Patched { .. }))
    }

    /// Services that already had the target set
    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, ServiceOutcome::Unchanged { .. }))
    }

    /// Services whose write failed
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ServiceOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&ServiceOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// Interface named by the Service's opt-in annotation
pub fn interface_annotation<'a>(service: &'a Service, key: &str) -> Option<&'a str> {
    service
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

/// Current `spec.externalIPs`, empty when unset
pub fn external_ips(service: &Service) -> &[String] {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.external_ips.as_deref())
        .unwrap_or_default()
}

/// Compute `(current - withdrawn) ∪ {new_ip}`
pub fn target_external_ips(
    current: &[String],
    withdrawn: &BTreeSet<String>,
    new_ip: &str,
) -> BTreeSet<String> {
    let mut target: BTreeSet<String> = current
        .iter()
        .filter(|ip| !withdrawn.contains(ip.as_str()))
        .cloned()
        .collect();
    target.insert(new_ip.to_string());
    target
}

/// Unordered, duplicate-insensitive comparison
pub fn external_ips_equal(current: &[String], target: &BTreeSet<String>) -> bool {
    let current: BTreeSet<&str> = current.iter().map(String::as_str).collect();
    current.len() == target.len() && target.iter().all(|ip| current.contains(ip.as_str()))
}

/// Rewrites annotated Services after an interface change
pub struct ServicePatcher {
    store: Box<dyn ServiceStore>,
    annotation_key: String,
    api_timeout: Option<Duration>,
}

impl ServicePatcher {
    /// Create a patcher over a Service store
    ///
    /// # Parameters
    ///
    /// - `store`: Cluster access
    /// - `annotation_key`: Annotation naming a Service's interface
    /// - `api_timeout`: Optional bound on each list/replace call
    pub fn new(
        store: Box<dyn ServiceStore>,
        annotation_key: impl Into<String>,
        api_timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            annotation_key: annotation_key.into(),
            api_timeout,
        }
    }

    /// Annotation key this patcher filters on
    pub fn annotation_key(&self) -> &str {
        &self.annotation_key
    }

    /// Name of the underlying Service store
    pub fn store_name(&self) -> &'static str {
        self.store.store_name()
    }

    /// Reconcile every Service annotated with the changed interface
    ///
    /// # Returns
    ///
    /// - `Ok(PatchSummary)`: Per-Service outcomes; individual write failures
    ///   are recorded there and do not stop the remaining Services
    /// - `Err(Error)`: The listing failed, nothing was patched
    pub async fn reconcile_interface(&self, change: &InterfaceChange) -> Result<PatchSummary> {
        let services = self
            .bounded("list services", self.store.list_services())
            .await
            .inspect_err(|e| error!("{}", e))?;

        let withdrawn = change.withdrawn();
        let new_ip = change.new_ip.to_string();
        let mut summary = PatchSummary::default();

        for service in services
            .iter()
            .filter(|svc| {
                interface_annotation(svc, &self.annotation_key) == Some(change.interface.as_str())
            })
        {
            let outcome = self.reconcile_service(service, &withdrawn, &new_ip).await;
            summary.outcomes.push(outcome);
        }

        debug!(
            "Interface {}: {} matched, {} patched, {} unchanged, {} failed",
            change.interface,
            summary.matched(),
            summary.patched(),
            summary.unchanged(),
            summary.failed()
        );
        Ok(summary)
    }

    async fn reconcile_service(
        &self,
        service: &Service,
        withdrawn: &BTreeSet<String>,
        new_ip: &str,
    ) -> ServiceOutcome {
        let namespace = service.metadata.namespace.clone().unwrap_or_default();
        let name = service.metadata.name.clone().unwrap_or_default();

        let current = external_ips(service);
        let target = target_external_ips(current, withdrawn, new_ip);
        if external_ips_equal(current, &target) {
            debug!("Service {}/{} already has {:?}, skipping", namespace, name, target);
            return ServiceOutcome::Unchanged { namespace, name };
        }

        let external_ips: Vec<String> = target.into_iter().collect();
        let mut updated = service.clone();
        updated
            .spec
            .get_or_insert_with(Default::default)
            .external_ips = Some(external_ips.clone());

        match self
            .bounded("replace service", self.store.replace_service(&updated))
            .await
        {
            Ok(()) => {
                info!("Updated externalIP for service {}/{}", namespace, name);
                ServiceOutcome::Patched {
                    namespace,
                    name,
                    external_ips,
                }
            }
            Err(e) => {
                warn!("Error updating service {}/{}: {}", namespace, name, e);
                ServiceOutcome::Failed {
                    namespace,
                    name,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match self.api_timeout {
            None => call.await,
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Error::Timeout {
                    operation,
                    secs: limit.as_secs(),
                })?,
        }
    }
}
