//! The Probe: confirms liveness and locates the OpenAPI endpoint for a
//! candidate service. Grounded on
//! `original_source/src/core/istio_discovery.py`'s `HealthChecker`.

use std::time::Duration;

use tracing::{info, warn};

use crate::model::ServiceDescriptor;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Ordered list of candidate OpenAPI document paths. First 2xx + JSON
/// response wins.
const OPENAPI_CANDIDATE_PATHS: &[&str] = &[
    "/v3/api-docs",
    "/api-docs",
    "/swagger.json",
    "/openapi.json",
    "/docs/openapi.json",
];

/// Probes well-known paths to confirm liveness and locate the OpenAPI
/// endpoint of a service. Network errors, non-2xx, and non-JSON responses
/// are not propagated as errors — they simply mean "no endpoint here".
pub struct Probe {
    client: reqwest::Client,
}

impl Probe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .expect("reqwest client config is valid");
        Self { client }
    }

    /// Enriches the descriptor with a confirmed `openapi_path`, or leaves
    /// it `None` if no candidate path answered. Returns `None` entirely
    /// when the service fails its liveness check (it is omitted from the
    /// returned set, per the specification).
    pub async fn probe(&self, mut descriptor: ServiceDescriptor) -> Option<ServiceDescriptor> {
        if !self.is_live(&descriptor).await {
            info!(service = %descriptor.name, namespace = %descriptor.namespace, "probe: unhealthy, skipping");
            return None;
        }

        descriptor.openapi_path = self.locate_openapi_endpoint(&descriptor).await;
        Some(descriptor)
    }

    async fn is_live(&self, descriptor: &ServiceDescriptor) -> bool {
        let Some(health_path) = &descriptor.health_path else {
            // No health hint exists: assume live.
            return true;
        };
        let Some(base) = descriptor.endpoints.first() else {
            return true;
        };

        let url = format!("{}{health_path}", base.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(service = %descriptor.name, %url, error = %e, "probe: health check failed");
                false
            }
        }
    }

    async fn locate_openapi_endpoint(&self, descriptor: &ServiceDescriptor) -> Option<String> {
        for endpoint in &descriptor.endpoints {
            for path in OPENAPI_CANDIDATE_PATHS {
                let url = format!("{}{path}", endpoint.trim_end_matches('/'));
                match self.client.get(&url).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        let is_json = resp
                            .headers()
                            .get(reqwest::header::CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .map(|ct| ct.contains("json"))
                            .unwrap_or(false);
                        if is_json {
                            return Some(url);
                        }
                    }
                    _ => continue,
                }
            }
        }
        None
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn descriptor(base_url: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            name: "orders".to_string(),
            namespace: "default".to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            endpoints: vec![base_url.to_string()],
            health_path: None,
            openapi_path: None,
            version: None,
        }
    }

    #[tokio::test]
    async fn no_health_path_assumes_live_and_finds_openapi() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/api-docs"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"{"openapi":"3.0.0"}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let probe = Probe::new();
        let result = probe.probe(descriptor(&server.uri())).await;

        let enriched = result.expect("live service must be returned");
        assert_eq!(enriched.openapi_path.as_deref(), Some(format!("{}/v3/api-docs", server.uri())).as_deref());
    }

    #[tokio::test]
    async fn unhealthy_service_is_omitted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/actuator/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut d = descriptor(&server.uri());
        d.health_path = Some("/actuator/health".to_string());

        let probe = Probe::new();
        assert!(probe.probe(d).await.is_none());
    }

    #[tokio::test]
    async fn non_json_response_is_not_an_openapi_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let probe = Probe::new();
        let result = probe.probe(descriptor(&server.uri())).await.unwrap();
        assert!(result.openapi_path.is_none());
    }
}
