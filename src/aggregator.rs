//! The Aggregator: caches per-service overviews and serves fleet-wide
//! queries. Grounded on the `ClusterState` cache in the teacher's
//! `src/commands/watch.rs` (`Arc<Mutex<ClusterState>>` guarding a
//! snapshot queried by the REST handlers), generalized to the
//! `(service, namespace) → ServiceOverview` mapping of §4.5.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::model::{ComplianceBand, Finding, FindingKind, FleetSummary, Identity, ServiceOverview};
use crate::recommendations::{self, FieldNamingRecommendation};

/// Caches the most recent `ServiceOverview` per identity. Writers hold
/// the lock only long enough to swap one entry; readers take a shared
/// lock and always see an internally consistent snapshot across keys.
#[derive(Clone)]
pub struct Aggregator {
    cache: Arc<RwLock<BTreeMap<Identity, ServiceOverview>>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Atomically replaces the cached entry for `overview`'s identity.
    pub async fn update(&self, overview: ServiceOverview) {
        let mut cache = self.cache.write().await;
        cache.insert(overview.identity(), overview);
    }

    /// Snapshot of every cached overview, identity order.
    pub async fn list(&self) -> Vec<ServiceOverview> {
        self.cache.read().await.values().cloned().collect()
    }

    pub async fn get(&self, identity: &Identity) -> Option<ServiceOverview> {
        self.cache.read().await.get(identity).cloned()
    }

    pub async fn details_naming(&self, identity: &Identity) -> Vec<Finding> {
        self.get(identity)
            .await
            .map(|o| o.findings_of_kind(FindingKind::Naming))
            .unwrap_or_default()
    }

    pub async fn details_errors(&self, identity: &Identity) -> Vec<Finding> {
        self.get(identity)
            .await
            .map(|o| o.findings_of_kind(FindingKind::ErrorShape))
            .unwrap_or_default()
    }

    /// Computes the fleet summary over the current snapshot. Takes no
    /// persistent state of its own — a pure view over `list()`.
    pub async fn summary(&self) -> FleetSummary {
        let overviews = self.list().await;
        summarize(&overviews)
    }

    /// Fleet-wide field naming recommendations, computed over the
    /// current snapshot (§4.9). Pure view, same as `summary()` — takes
    /// no state of its own.
    pub async fn recommendations(&self) -> Vec<FieldNamingRecommendation> {
        let overviews = self.list().await;
        recommendations::generate(&overviews)
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn summarize(overviews: &[ServiceOverview]) -> FleetSummary {
    let total_services = overviews.len();
    let average_score = if total_services == 0 {
        0.0
    } else {
        overviews.iter().map(|o| o.compliance_score).sum::<f64>() / total_services as f64
    };

    let mut critical_issues = 0;
    let mut major_issues = 0;
    let mut minor_issues = 0;
    let mut info_issues = 0;
    let mut high_band = 0;
    let mut medium_band = 0;
    let mut low_band = 0;

    for overview in overviews {
        for finding in &overview.findings {
            match finding.severity {
                crate::model::Severity::Critical => critical_issues += 1,
                crate::model::Severity::Major => major_issues += 1,
                crate::model::Severity::Minor => minor_issues += 1,
                crate::model::Severity::Info => info_issues += 1,
            }
        }
        match ComplianceBand::of(overview.compliance_score) {
            ComplianceBand::High => high_band += 1,
            ComplianceBand::Medium => medium_band += 1,
            ComplianceBand::Low => low_band += 1,
        }
    }

    FleetSummary {
        total_services,
        average_score,
        critical_issues,
        major_issues,
        minor_issues,
        info_issues,
        high_band,
        medium_band,
        low_band,
        generated_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;

    fn overview(service: &str, score: f64, severities: &[Severity]) -> ServiceOverview {
        ServiceOverview {
            service: service.to_string(),
            namespace: "default".to_string(),
            total_endpoints: 1,
            naming_issue_count: 0,
            error_issue_count: 0,
            compliance_score: score,
            findings: severities
                .iter()
                .map(|s| Finding {
                    kind: FindingKind::Other,
                    severity: *s,
                    rule_id: "r".to_string(),
                    message: "m".to_string(),
                    location: "l".to_string(),
                    line_hint: None,
                    affected_fields: Vec::new(),
                    recommendation: "r".to_string(),
                })
                .collect(),
            analyzed_at: chrono::Utc::now(),
            source_url: "http://example".to_string(),
            rule_set_version: "v1".to_string(),
        }
    }

    #[tokio::test]
    async fn update_then_list_has_one_entry_per_identity() {
        let aggregator = Aggregator::new();
        aggregator.update(overview("orders", 100.0, &[])).await;
        aggregator.update(overview("orders", 52.6, &[Severity::Major])).await;
        aggregator.update(overview("users", 100.0, &[])).await;

        let list = aggregator.list().await;
        assert_eq!(list.len(), 2);
        let orders = list.iter().find(|o| o.service == "orders").unwrap();
        assert_eq!(orders.compliance_score, 52.6);
    }

    #[tokio::test]
    async fn summary_matches_scenario_s1() {
        let aggregator = Aggregator::new();
        aggregator.update(overview("a", 100.0, &[])).await;
        aggregator.update(overview("b", 100.0, &[])).await;

        let summary = aggregator.summary().await;
        assert_eq!(summary.total_services, 2);
        assert_eq!(summary.average_score, 100.0);
        assert_eq!(summary.high_band, 2);
        assert_eq!(summary.medium_band, 0);
        assert_eq!(summary.low_band, 0);
    }

    #[tokio::test]
    async fn summary_of_empty_cache_has_zero_average() {
        let aggregator = Aggregator::new();
        let summary = aggregator.summary().await;
        assert_eq!(summary.total_services, 0);
        assert_eq!(summary.average_score, 0.0);
    }

    #[tokio::test]
    async fn recommendations_is_empty_over_empty_cache() {
        let aggregator = Aggregator::new();
        assert!(aggregator.recommendations().await.is_empty());
    }

    #[tokio::test]
    async fn details_filter_by_kind() {
        let aggregator = Aggregator::new();
        let mut o = overview("orders", 70.0, &[Severity::Major]);
        o.findings[0].kind = FindingKind::Naming;
        aggregator.update(o).await;

        let id = Identity::new("orders", "default");
        assert_eq!(aggregator.details_naming(&id).await.len(), 1);
        assert!(aggregator.details_errors(&id).await.is_empty());
    }
}
