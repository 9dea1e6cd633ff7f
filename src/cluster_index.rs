//! The `ClusterIndex` capability: enumerates candidate services from
//! cluster state. The core depends only on the [`ClusterIndex`] trait —
//! grounded on `original_source/src/core/istio_discovery.py`'s
//! `IstioServiceDiscovery`, translated from the Kubernetes Python client's
//! `CoreV1Api.list_namespaced_service` to `kube-rs`'s `Api<Service>`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, ListParams};
use kube::Client;

use crate::error::{GovernanceError, Result};
use crate::model::ServiceDescriptor;

/// Label/annotation filters applied during enumeration.
#[derive(Debug, Clone, Default)]
pub struct Selectors {
    /// A descriptor is included iff every selector label matches.
    pub label_selectors: BTreeMap<String, String>,
    /// Annotation filters are advisory — a mismatch never excludes.
    pub annotation_filters: BTreeMap<String, String>,
}

/// Yields candidate `ServiceDescriptor`s from cluster state. The core is
/// indifferent to the backing source (real cluster, static file, test
/// fake) — it only calls `enumerate`.
#[async_trait]
pub trait ClusterIndex: Send + Sync {
    async fn enumerate(
        &self,
        namespaces: &[String],
        selectors: &Selectors,
    ) -> Result<Vec<ServiceDescriptor>>;
}

/// A `ClusterIndex` backed by a live Kubernetes API server, mirroring
/// `IstioServiceDiscovery._discover_services_in_namespace`.
pub struct KubeClusterIndex {
    client: Client,
}

impl KubeClusterIndex {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects using the ambient kubeconfig/in-cluster config, the way
    /// the teacher's `commands::check::run` does.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| GovernanceError::CycleFatal(format!("cluster unreachable: {e}")))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ClusterIndex for KubeClusterIndex {
    async fn enumerate(
        &self,
        namespaces: &[String],
        selectors: &Selectors,
    ) -> Result<Vec<ServiceDescriptor>> {
        let mut all = Vec::new();

        for namespace in namespaces {
            let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
            let services = api
                .list(&ListParams::default())
                .await
                .map_err(|e| {
                    GovernanceError::CycleFatal(format!(
                        "listing services in namespace {namespace} failed: {e}"
                    ))
                })?;

            for svc in services.items {
                if let Some(descriptor) = to_descriptor(&svc, namespace, selectors) {
                    all.push(descriptor);
                }
            }
        }

        Ok(all)
    }
}

fn to_descriptor(
    svc: &Service,
    namespace: &str,
    selectors: &Selectors,
) -> Option<ServiceDescriptor> {
    let meta = &svc.metadata;
    let labels: BTreeMap<String, String> = meta.labels.clone().unwrap_or_default().into_iter().collect();
    let annotations: BTreeMap<String, String> =
        meta.annotations.clone().unwrap_or_default().into_iter().collect();

    for (key, value) in &selectors.label_selectors {
        if labels.get(key) != Some(value) {
            return None;
        }
    }
    // Annotation filters are advisory: mismatches never exclude a service.

    let name = meta.name.clone()?;

    let mut endpoints = Vec::new();
    if let Some(spec) = &svc.spec {
        if let Some(ports) = &spec.ports {
            for port in ports {
                endpoints.push(format!(
                    "http://{name}.{namespace}.svc.cluster.local:{}",
                    port.port
                ));
            }
        }
    }
    if endpoints.is_empty() {
        return None;
    }

    let health_path = annotations
        .get("health.check.path")
        .cloned()
        .or_else(|| Some("/actuator/health".to_string()));

    let version = labels
        .get("version")
        .or_else(|| labels.get("app.version"))
        .cloned();

    Some(ServiceDescriptor {
        name,
        namespace: namespace.to_string(),
        labels,
        annotations,
        endpoints,
        health_path,
        openapi_path: None,
        version,
    })
}

/// A `ClusterIndex` backed by an in-memory list, for tests and for
/// deployments without a live cluster (e.g. a static service registry).
pub struct StaticClusterIndex {
    descriptors: Vec<ServiceDescriptor>,
}

impl StaticClusterIndex {
    pub fn new(descriptors: Vec<ServiceDescriptor>) -> Self {
        Self { descriptors }
    }
}

#[async_trait]
impl ClusterIndex for StaticClusterIndex {
    async fn enumerate(
        &self,
        namespaces: &[String],
        selectors: &Selectors,
    ) -> Result<Vec<ServiceDescriptor>> {
        Ok(self
            .descriptors
            .iter()
            .filter(|d| namespaces.iter().any(|ns| ns == &d.namespace))
            .filter(|d| {
                selectors
                    .label_selectors
                    .iter()
                    .all(|(k, v)| d.labels.get(k) == Some(v))
            })
            .cloned()
            .collect())
    }
}
