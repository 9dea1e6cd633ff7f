//! Core data model: the types that flow between pipeline stages.
//!
//! Grounded on `original_source/src/core/istio_discovery.py` (`ServiceInfo`),
//! `original_source/src/core/api_harvester.py` (`APISpec`),
//! `original_source/src/core/consistency_analyzer.py` (`FieldInfo`,
//! `ConsistencyIssue`), and `original_source/src/models/compliance_models.py`
//! (`ServiceComplianceOverview`, `ComplianceSummary`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity key used throughout the pipeline: `(service, namespace)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub service: String,
    pub namespace: String,
}

impl Identity {
    pub fn new(service: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.service)
    }
}

/// Identity of a candidate service, as produced by a `ClusterIndex` each
/// cycle and enriched by the Probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Non-empty ordered sequence of base URLs.
    pub endpoints: Vec<String>,
    pub health_path: Option<String>,
    pub openapi_path: Option<String>,
    pub version: Option<String>,
}

impl ServiceDescriptor {
    pub fn identity(&self) -> Identity {
        Identity::new(self.name.clone(), self.namespace.clone())
    }
}

/// A harvested OpenAPI artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecDocument {
    pub service: String,
    pub namespace: String,
    pub source_url: String,
    pub content: serde_json::Value,
    pub version: Option<String>,
    pub harvested_at: DateTime<Utc>,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
    pub content_hash: String,
}

impl SpecDocument {
    pub fn identity(&self) -> Identity {
        Identity::new(self.service.clone(), self.namespace.clone())
    }
}

/// One addressable property inside a harvested document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRecord {
    pub name: String,
    pub r#type: String,
    pub format: Option<String>,
    pub required: bool,
    pub description: Option<String>,
    pub service: String,
    pub namespace: String,
    /// Structural path into the document, e.g.
    /// `components.schemas.Patient.properties.birthDate`.
    pub location: String,
}

/// Kind of compliance issue, fixed taxonomy per the specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Naming,
    ErrorShape,
    PathShape,
    TypeMismatch,
    MissingRequired,
    ProfileViolation,
    Other,
}

/// Severity of a finding, used to weight the compliance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Info,
}

impl Severity {
    /// Weight used by the score formula (§4.4).
    pub fn weight(self) -> u32 {
        match self {
            Severity::Critical => 3,
            Severity::Major => 2,
            Severity::Minor => 1,
            Severity::Info => 0,
        }
    }
}

/// A single compliance issue emitted by the Linter and classified by the
/// Analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub rule_id: String,
    pub message: String,
    pub location: String,
    pub line_hint: Option<u32>,
    /// References into the field inventory; always at least one entry.
    pub affected_fields: Vec<FieldRecord>,
    pub recommendation: String,
}

/// The Analyzer's result for one service in one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOverview {
    pub service: String,
    pub namespace: String,
    pub total_endpoints: u32,
    pub naming_issue_count: u32,
    pub error_issue_count: u32,
    pub compliance_score: f64,
    pub findings: Vec<Finding>,
    pub analyzed_at: DateTime<Utc>,
    pub source_url: String,
    /// Opaque rule-set version this overview was computed against, used
    /// by the Aggregator to invalidate stale entries (§9).
    pub rule_set_version: String,
}

impl ServiceOverview {
    pub fn identity(&self) -> Identity {
        Identity::new(self.service.clone(), self.namespace.clone())
    }

    pub fn findings_of_kind(&self, kind: FindingKind) -> Vec<Finding> {
        self.findings
            .iter()
            .filter(|f| f.kind == kind)
            .cloned()
            .collect()
    }
}

/// Compliance band used by the fleet-wide histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceBand {
    High,
    Medium,
    Low,
}

impl ComplianceBand {
    pub fn of(score: f64) -> Self {
        if score >= 90.0 {
            ComplianceBand::High
        } else if score >= 70.0 {
            ComplianceBand::Medium
        } else {
            ComplianceBand::Low
        }
    }
}

/// Aggregate across all current overviews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total_services: usize,
    pub average_score: f64,
    pub critical_issues: usize,
    pub major_issues: usize,
    pub minor_issues: usize,
    pub info_issues: usize,
    pub high_band: usize,
    pub medium_band: usize,
    pub low_band: usize,
    pub generated_at: DateTime<Utc>,
}
