//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides scriptable stand-ins for the interface table and the
//! cluster, with call counters the tests assert on.

#![allow(dead_code)]

use extip_core::engine::EngineEvent;
use extip_core::error::{Error, Result};
use extip_core::traits::{InterfaceSource, NetworkInterface, ServiceStore};
use extip_core::ControllerConfig;
use k8s_openapi::api::core::v1::{Service, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const ANNOTATION: &str = "external-ip-interface";

/// An interface table the test can rewrite between passes
#[derive(Clone, Default)]
pub struct ScriptedInterfaces {
    table: Arc<Mutex<Vec<NetworkInterface>>>,
    fail_enumeration: Arc<AtomicBool>,
    enumerate_call_count: Arc<AtomicUsize>,
}

impl ScriptedInterfaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with interfaces given as (name, address) pairs
    pub fn with(entries: &[(&str, &str)]) -> Self {
        let source = Self::new();
        for (name, addr) in entries {
            source.set(name, &[addr]);
        }
        source
    }

    /// Add or replace an interface with the given addresses
    pub fn set(&self, name: &str, addrs: &[&str]) {
        let addresses: Vec<IpAddr> = addrs.iter().map(|a| a.parse().unwrap()).collect();
        let mut table = self.table.lock().unwrap();
        match table.iter_mut().find(|iface| iface.name == name) {
            Some(iface) => iface.addresses = addresses,
            None => table.push(NetworkInterface::new(name, addresses)),
        }
    }

    /// Remove an interface entirely
    pub fn remove(&self, name: &str) {
        self.table.lock().unwrap().retain(|iface| iface.name != name);
    }

    /// Make every enumeration fail (or succeed again)
    pub fn fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    /// Get the number of times the table was enumerated
    pub fn enumerate_call_count(&self) -> usize {
        self.enumerate_call_count.load(Ordering::SeqCst)
    }
}

impl InterfaceSource for ScriptedInterfaces {
    fn interfaces(&self) -> Result<Vec<NetworkInterface>> {
        self.enumerate_call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(Error::enumeration("scripted failure"));
        }
        Ok(self.table.lock().unwrap().clone())
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// An in-memory cluster that counts list and replace calls
#[derive(Clone, Default)]
pub struct MockServiceStore {
    services: Arc<Mutex<Vec<Service>>>,
    list_call_count: Arc<AtomicUsize>,
    replace_call_count: Arc<AtomicUsize>,
    fail_list: Arc<AtomicBool>,
    fail_replace_for: Arc<Mutex<HashSet<String>>>,
    replace_delay: Arc<Mutex<Option<Duration>>>,
    written: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl MockServiceStore {
    pub fn new(services: Vec<Service>) -> Self {
        let store = Self::default();
        *store.services.lock().unwrap() = services;
        store
    }

    /// Get the number of times list_services() was called
    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times replace_service() was called
    pub fn replace_call_count(&self) -> usize {
        self.replace_call_count.load(Ordering::SeqCst)
    }

    /// Services written, as ("namespace/name", externalIPs), in order
    pub fn written(&self) -> Vec<(String, Vec<String>)> {
        self.written.lock().unwrap().clone()
    }

    /// Make list_services() fail (or succeed again)
    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Make replace_service() fail for one "namespace/name"
    pub fn fail_replace_for(&self, key: &str) {
        self.fail_replace_for.lock().unwrap().insert(key.to_string());
    }

    /// Let replace_service() succeed for every service again
    pub fn clear_replace_failures(&self) {
        self.fail_replace_for.lock().unwrap().clear();
    }

    /// Delay every replace_service() call
    pub fn set_replace_delay(&self, delay: Duration) {
        *self.replace_delay.lock().unwrap() = Some(delay);
    }

    /// Current externalIPs of a stored service as a set
    pub fn external_ip_set(&self, namespace: &str, name: &str) -> BTreeSet<String> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find(|svc| key_of(svc) == format!("{namespace}/{name}"))
            .and_then(|svc| svc.spec.as_ref())
            .and_then(|spec| spec.external_ips.clone())
            .unwrap_or_default()
            .into_iter()
            .collect()
    }
}

#[async_trait::async_trait]
impl ServiceStore for MockServiceStore {
    async fn list_services(&self) -> Result<Vec<Service>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::list("scripted list failure"));
        }
        Ok(self.services.lock().unwrap().clone())
    }

    async fn replace_service(&self, service: &Service) -> Result<()> {
        self.replace_call_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.replace_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let key = key_of(service);
        if self.fail_replace_for.lock().unwrap().contains(&key) {
            let namespace = service.metadata.namespace.clone().unwrap_or_default();
            let name = service.metadata.name.clone().unwrap_or_default();
            return Err(Error::update(namespace, name, "scripted conflict"));
        }

        let ips = service
            .spec
            .as_ref()
            .and_then(|spec| spec.external_ips.clone())
            .unwrap_or_default();
        self.written.lock().unwrap().push((key.clone(), ips));

        let mut services = self.services.lock().unwrap();
        if let Some(existing) = services.iter_mut().find(|svc| key_of(svc) == key) {
            *existing = service.clone();
        }
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "mock"
    }
}

fn key_of(service: &Service) -> String {
    format!(
        "{}/{}",
        service.metadata.namespace.as_deref().unwrap_or_default(),
        service.metadata.name.as_deref().unwrap_or_default()
    )
}

/// Build a Service, optionally annotated with an interface
pub fn service(namespace: &str, name: &str, interface: Option<&str>, external_ips: &[&str]) -> Service {
    Service {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            annotations: interface
                .map(|iface| BTreeMap::from([(ANNOTATION.to_string(), iface.to_string())])),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            external_ips: Some(external_ips.iter().map(|ip| ip.to_string()).collect()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build a string set
pub fn ip_set(ips: &[&str]) -> BTreeSet<String> {
    ips.iter().map(|ip| ip.to_string()).collect()
}

/// Configuration whose timer never fires during a test
pub fn minimal_config() -> ControllerConfig {
    ControllerConfig::new().with_resync_interval_secs(3600)
}

/// Drain every event currently buffered in the channel
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
