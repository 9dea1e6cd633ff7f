//! The Analyzer: walks a document, extracts the field inventory, invokes
//! the Linter and the optional domain profile, classifies findings, and
//! computes the deterministic compliance score. Grounded on
//! `original_source/src/core/consistency_analyzer.py`'s
//! `ConsistencyAnalyzer.analyze_consistency` and on
//! `original_source/src/core/fhir_compliance.py` for the profile pass.

use serde_json::Value;

use crate::fields::extract_fields;
use crate::linter::{Linter, NativeFinding, NativeSeverity};
use crate::model::{FieldRecord, Finding, FindingKind, SpecDocument, ServiceOverview, Severity};
use crate::profile::DomainProfile;

/// Base weight added to every score computation, per §4.4. The score
/// formula reduces to `100 * base / (sum_of_finding_weights + base)`,
/// which is exactly 100 when there are no weighted findings.
const BASE_WEIGHT: u32 = 10;

const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "patch", "head", "options", "trace",
];

pub struct Analyzer<'a> {
    linter: &'a dyn Linter,
    profile: &'a DomainProfile,
}

impl<'a> Analyzer<'a> {
    pub fn new(linter: &'a dyn Linter, profile: &'a DomainProfile) -> Self {
        Self { linter, profile }
    }

    /// Produces the `ServiceOverview` for one document. Pure given
    /// `(doc, linter, profile)` except for the `analyzed_at` timestamp
    /// (P2): two invocations always yield identical scores and finding
    /// counts.
    pub fn analyze(&self, doc: &SpecDocument) -> ServiceOverview {
        let fields = extract_fields(&doc.content, &doc.service, &doc.namespace);

        let mut findings: Vec<Finding> = self
            .linter
            .lint(&doc.content, &fields)
            .into_iter()
            .map(|native| classify_native_finding(native, &fields))
            .collect();

        findings.extend(self.profile.check(&doc.content).into_iter().map(|v| Finding {
            kind: FindingKind::ProfileViolation,
            severity: Severity::Major,
            rule_id: "domain_profile".to_string(),
            message: v.message,
            location: v.location,
            line_hint: None,
            affected_fields: fields
                .iter()
                .filter(|f| f.location.contains(&v.field_name))
                .cloned()
                .collect(),
            recommendation: v.recommendation,
        }));

        let naming_issue_count = findings.iter().filter(|f| f.kind == FindingKind::Naming).count() as u32;
        let error_issue_count = findings.iter().filter(|f| f.kind == FindingKind::ErrorShape).count() as u32;
        let total_endpoints = count_endpoints(&doc.content);
        let compliance_score = compute_score(&findings);

        ServiceOverview {
            service: doc.service.clone(),
            namespace: doc.namespace.clone(),
            total_endpoints,
            naming_issue_count,
            error_issue_count,
            compliance_score,
            findings,
            analyzed_at: chrono::Utc::now(),
            source_url: doc.source_url.clone(),
            rule_set_version: self.linter.rule_set_version(),
        }
    }
}

fn classify_native_finding(native: NativeFinding, fields: &[FieldRecord]) -> Finding {
    let kind = match native.kind.as_str() {
        "naming" => FindingKind::Naming,
        "error_shape" => FindingKind::ErrorShape,
        "path_shape" => FindingKind::PathShape,
        "type_mismatch" => FindingKind::TypeMismatch,
        "missing_required" => FindingKind::MissingRequired,
        "profile_violation" => FindingKind::ProfileViolation,
        _ => FindingKind::Other,
    };

    let severity = match native.native_severity {
        NativeSeverity::Error => Severity::Critical,
        NativeSeverity::Warn => Severity::Major,
        NativeSeverity::Info => Severity::Minor,
        NativeSeverity::Hint => Severity::Info,
    };

    let affected_fields: Vec<FieldRecord> = native
        .affected_field_locations
        .iter()
        .filter_map(|location| fields.iter().find(|f| &f.location == location))
        .cloned()
        .collect();

    Finding {
        kind,
        severity,
        rule_id: native.rule_id,
        message: native.message,
        location: native.location.clone(),
        line_hint: None,
        affected_fields,
        recommendation: native.recommendation,
    }
}

/// `score = clamp(0, 100, 100 * base / (sum_of_weights + base))`. Zero
/// findings (or only info-severity ones, weight 0) yields exactly 100.0.
fn compute_score(findings: &[Finding]) -> f64 {
    let total_weight: u32 = findings.iter().map(|f| f.severity.weight()).sum();
    let denominator = total_weight + BASE_WEIGHT;
    let raw = 100.0 * BASE_WEIGHT as f64 / denominator as f64;
    (raw.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

fn count_endpoints(content: &Value) -> u32 {
    let Some(paths) = content.get("paths").and_then(Value::as_object) else {
        return 0;
    };
    paths
        .values()
        .filter_map(Value::as_object)
        .map(|methods| {
            HTTP_METHODS
                .iter()
                .filter(|m| methods.contains_key(**m))
                .count() as u32
        })
        .sum()
}
