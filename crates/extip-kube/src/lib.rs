// # Kubernetes Service Adapter
//
// This crate connects the extip core to a Kubernetes API server.
//
// ## Components
//
// - `KubeServiceStore`: cluster-wide list and whole-object replace of Services
// - `KubeServiceEvents`: kube-runtime watcher mapped to `ServiceEvent`s
//
// ## Architectural Constraints
//
// Both components are thin adapters. They make exactly one API call per
// invocation and never retry on their own: the reconciliation loop re-derives
// everything on the next pass. Filtering by annotation and deciding whether a
// write is needed stay in `ServicePatcher`.
//
// ## Watch Semantics
//
// | watcher event | emitted         |
// |---------------|-----------------|
// | `InitApply`   | `Added`         |
// | `Apply`       | `Updated`       |
// | `Delete`      | nothing         |
// | `Init*`       | nothing         |
//
// Watch errors are logged and the watcher backs off before re-listing.

use async_trait::async_trait;
use extip_core::traits::{ServiceEvent, ServiceEventSource, ServiceStore};
use extip_core::{Error, Result};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::api::{ListParams, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

/// Service store backed by the Kubernetes API
///
/// Lists across all namespaces and writes with a full replace (PUT), so a
/// concurrent change to the same object fails with a conflict instead of
/// being silently overwritten.
#[derive(Clone)]
pub struct KubeServiceStore {
    client: Client,
}

impl std::fmt::Debug for KubeServiceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeServiceStore").finish_non_exhaustive()
    }
}

impl KubeServiceStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceStore for KubeServiceStore {
    async fn list_services(&self) -> Result<Vec<Service>> {
        let api: Api<Service> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::list(e.to_string()))?;

        tracing::debug!("Listed {} service(s)", list.items.len());
        Ok(list.items)
    }

    async fn replace_service(&self, service: &Service) -> Result<()> {
        let name = service.name_any();
        let namespace = service.namespace().ok_or_else(|| {
            Error::update("", name.clone(), "service has no namespace")
        })?;

        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&name, &PostParams::default(), service)
            .await
            .map_err(|e| Error::update(namespace.clone(), name.clone(), e.to_string()))?;

        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "kubernetes"
    }
}

/// Service notifications from a cluster-wide kube-runtime watcher
#[derive(Clone)]
pub struct KubeServiceEvents {
    client: Client,
}

impl std::fmt::Debug for KubeServiceEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeServiceEvents").finish_non_exhaustive()
    }
}

impl KubeServiceEvents {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ServiceEventSource for KubeServiceEvents {
    fn watch(&self) -> Pin<Box<dyn Stream<Item = ServiceEvent> + Send + 'static>> {
        let api: Api<Service> = Api::all(self.client.clone());

        tracing::info!("Starting Service watcher...");

        let stream = watcher(api, watcher::Config::default())
            .default_backoff()
            .filter_map(|item| {
                let event = match item {
                    Ok(event) => to_service_event(event),
                    Err(e) => {
                        tracing::warn!("Service watcher error: {}", e);
                        None
                    }
                };
                futures::future::ready(event)
            });

        Box::pin(stream)
    }
}

/// Map a raw watcher event to the notification the core understands
fn to_service_event(event: watcher::Event<Service>) -> Option<ServiceEvent> {
    match event {
        watcher::Event::InitApply(svc) => Some(ServiceEvent::Added(Arc::new(svc))),
        watcher::Event::Apply(svc) => Some(ServiceEvent::Updated(Arc::new(svc))),
        watcher::Event::Delete(svc) => {
            tracing::trace!(
                "Ignoring delete of service {}/{}",
                svc.namespace().unwrap_or_default(),
                svc.name_any()
            );
            None
        }
        watcher::Event::Init | watcher::Event::InitDone => None,
    }
}
