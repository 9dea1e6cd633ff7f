//! The Linter capability and its reference implementation.
//!
//! The specification treats `Linter` as an external dependency the
//! Analyzer merely calls (§1, §6) — the core only needs the [`Linter`]
//! trait. [`ReferenceLinter`] is the one concrete, swappable
//! implementation the crate ships so the pipeline is testable end to
//! end, grounded directly on the rule classes in
//! `original_source/src/core/consistency_analyzer.py`
//! (`NamingConventionRule`, `RequiredFieldRule`) and on the
//! `error_response`/`endpoint_pattern` issue types in
//! `original_source/src/models/compliance_models.py`.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{GovernanceError, Result};
use crate::model::FieldRecord;

/// Native severity vocabulary a linter may use — the Analyzer maps these
/// onto the fixed `Severity` taxonomy per the table in §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeSeverity {
    Error,
    Warn,
    Info,
    Hint,
}

/// A finding as emitted by a `Linter`, before the Analyzer classifies its
/// `kind` into the fixed taxonomy and maps its severity.
#[derive(Debug, Clone)]
pub struct NativeFinding {
    /// Free-form kind string; the Analyzer buckets anything it doesn't
    /// recognise into `FindingKind::Other`.
    pub kind: String,
    pub native_severity: NativeSeverity,
    pub rule_id: String,
    pub message: String,
    pub location: String,
    pub recommendation: String,
    pub affected_field_locations: Vec<String>,
}

/// Applies a rule set to a document and its field inventory, returning
/// findings. The rule set's version is opaque to the Analyzer — it is
/// only compared for equality, to decide whether a cached overview is
/// stale (§9).
pub trait Linter: Send + Sync {
    fn lint(&self, content: &Value, fields: &[FieldRecord]) -> Vec<NativeFinding>;
    fn rule_set_version(&self) -> String;
}

/// Default reference rule set descriptor, used only to compute
/// `rule_set_version` — editing this list changes the version and
/// invalidates cached overviews. Overridden by `RULE_SET_PATH` when set
/// (see [`ReferenceLinter::from_file`]); the rule *logic* below is not
/// configurable, only the version descriptors the crate reports for it.
const DEFAULT_RULE_DESCRIPTORS: &[&str] = &[
    "naming_convention@1",
    "required_field_consistency@1",
    "error_response_shape@1",
    "path_shape@1",
];

/// A linter grounded on the teacher corpus's style-rule examples. Checks:
/// naming convention consistency within a service, required-field
/// consistency for the same concept across schemas in one document,
/// error-response envelope shape, and path template conventions.
pub struct ReferenceLinter {
    descriptors: Vec<String>,
}

impl ReferenceLinter {
    pub fn new() -> Self {
        Self {
            descriptors: DEFAULT_RULE_DESCRIPTORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Builds a linter reporting a custom set of rule descriptors. The
    /// checks run are unchanged; only `rule_set_version()` (and thus
    /// cache invalidation, §9) is affected.
    pub fn with_descriptors(descriptors: Vec<String>) -> Self {
        Self { descriptors }
    }

    /// Loads the rule descriptor list from a JSON file (an array of
    /// strings), per `RULE_SET_PATH` in §6.1. A missing or malformed file
    /// is process-fatal, mirroring `DomainProfile::from_file`.
    pub async fn from_file(path: &std::path::Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            GovernanceError::ProcessFatal(format!("reading rule set {path:?} failed: {e}"))
        })?;
        let descriptors: Vec<String> = serde_json::from_slice(&bytes).map_err(|e| {
            GovernanceError::ProcessFatal(format!("parsing rule set {path:?} failed: {e}"))
        })?;
        Ok(Self::with_descriptors(descriptors))
    }
}

impl Default for ReferenceLinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Linter for ReferenceLinter {
    fn lint(&self, content: &Value, fields: &[FieldRecord]) -> Vec<NativeFinding> {
        let mut findings = Vec::new();
        findings.extend(check_naming_convention(fields));
        findings.extend(check_required_consistency(fields));
        findings.extend(check_error_response_shape(content));
        findings.extend(check_path_shape(content));
        findings
    }

    fn rule_set_version(&self) -> String {
        let joined = self.descriptors.join(",");
        let digest = Sha256::digest(joined.as_bytes());
        format!("{digest:x}")
    }
}

fn naming_conventions() -> Vec<(&'static str, Regex)> {
    vec![
        ("camelCase", Regex::new(r"^[a-z][a-zA-Z0-9]*$").unwrap()),
        ("snake_case", Regex::new(r"^[a-z][a-z0-9_]*$").unwrap()),
        ("kebab-case", Regex::new(r"^[a-z][a-z0-9-]*$").unwrap()),
        ("PascalCase", Regex::new(r"^[A-Z][a-zA-Z0-9]*$").unwrap()),
    ]
}

/// Grounded on `NamingConventionRule.check`: flags a service whose fields
/// mix more than one naming convention.
fn check_naming_convention(fields: &[FieldRecord]) -> Vec<NativeFinding> {
    let conventions = naming_conventions();
    let mut used = HashSet::new();

    for field in fields {
        for (name, pattern) in &conventions {
            if pattern.is_match(&field.name) {
                used.insert(*name);
                break;
            }
        }
    }

    if used.len() > 1 {
        let mut names: Vec<&str> = used.into_iter().collect();
        names.sort();
        vec![NativeFinding {
            kind: "naming".to_string(),
            native_severity: NativeSeverity::Warn,
            rule_id: "naming_convention".to_string(),
            message: format!("mixed naming conventions in use: {}", names.join(", ")),
            location: "components.schemas".to_string(),
            recommendation: "use a single naming convention throughout the service".to_string(),
            affected_field_locations: fields.iter().map(|f| f.location.clone()).collect(),
        }]
    } else {
        Vec::new()
    }
}

fn normalize_field_name(name: &str) -> String {
    name.to_lowercase()
}

/// Grounded on `RequiredFieldRule.check`, adapted to the per-document
/// boundary: the same concept (by lowercased name) that is required in
/// one schema location and optional in another is a consistency issue
/// within this document.
fn check_required_consistency(fields: &[FieldRecord]) -> Vec<NativeFinding> {
    let mut groups: HashMap<String, Vec<&FieldRecord>> = HashMap::new();
    for field in fields {
        groups
            .entry(normalize_field_name(&field.name))
            .or_default()
            .push(field);
    }

    let mut findings = Vec::new();
    for (concept, group) in groups {
        if group.len() < 2 {
            continue;
        }
        let required: Vec<&&FieldRecord> = group.iter().filter(|f| f.required).collect();
        let optional: Vec<&&FieldRecord> = group.iter().filter(|f| !f.required).collect();
        if !required.is_empty() && !optional.is_empty() {
            findings.push(NativeFinding {
                kind: "missing_required".to_string(),
                native_severity: NativeSeverity::Warn,
                rule_id: "required_field_consistency".to_string(),
                message: format!("field '{concept}' is required in some locations but optional in others"),
                location: group[0].location.clone(),
                recommendation: "make the required/optional status consistent across schemas".to_string(),
                affected_field_locations: group.iter().map(|f| f.location.clone()).collect(),
            });
        }
    }
    findings
}

/// Grounded on the `error_response` `IssueType`: a 4xx/5xx response
/// schema lacking a conventional `code`/`message` error envelope.
fn check_error_response_shape(content: &Value) -> Vec<NativeFinding> {
    let mut findings = Vec::new();
    let Some(paths) = content.get("paths").and_then(Value::as_object) else {
        return findings;
    };

    for (path, path_def) in paths {
        let Some(methods) = path_def.as_object() else {
            continue;
        };
        for (method, method_def) in methods {
            let Some(responses) = method_def.get("responses").and_then(Value::as_object) else {
                continue;
            };
            for (status, response_def) in responses {
                let is_error_status = status
                    .chars()
                    .next()
                    .map(|c| c == '4' || c == '5')
                    .unwrap_or(false);
                if !is_error_status {
                    continue;
                }

                let schema = response_def.pointer("/content/application~1json/schema");
                let has_envelope = schema
                    .and_then(|s| s.get("properties"))
                    .and_then(Value::as_object)
                    .map(|props| props.contains_key("code") && props.contains_key("message"))
                    .unwrap_or(false);

                if !has_envelope {
                    findings.push(NativeFinding {
                        kind: "error_shape".to_string(),
                        native_severity: NativeSeverity::Error,
                        rule_id: "error_response_shape".to_string(),
                        message: format!(
                            "{method} {path} response {status} lacks a code/message error envelope"
                        ),
                        location: format!("paths.{path}.{method}.responses.{status}"),
                        recommendation: "return {code, message} for error responses".to_string(),
                        affected_field_locations: Vec::new(),
                    });
                }
            }
        }
    }
    findings
}

/// Grounded on the `endpoint_pattern` `IssueType`: flags a path that
/// isn't versioned (`/v{n}/...`) or whose resource segment isn't plural.
fn check_path_shape(content: &Value) -> Vec<NativeFinding> {
    let mut findings = Vec::new();
    let Some(paths) = content.get("paths").and_then(Value::as_object) else {
        return findings;
    };
    let version_prefix = Regex::new(r"^/v\d+/").unwrap();

    for path in paths.keys() {
        if !version_prefix.is_match(path) {
            findings.push(NativeFinding {
                kind: "path_shape".to_string(),
                native_severity: NativeSeverity::Info,
                rule_id: "path_shape".to_string(),
                message: format!("path '{path}' is not version-prefixed (expected /v{{n}}/...)"),
                location: format!("paths.{path}"),
                recommendation: "prefix the path with an API version, e.g. /v1/...".to_string(),
                affected_field_locations: Vec::new(),
            });
            continue;
        }

        if let Some(resource) = path
            .trim_start_matches(|c: char| c != '/' && c != '0')
            .split('/')
            .find(|seg| !seg.is_empty() && !seg.starts_with('v') && !seg.starts_with('{'))
        {
            if resource.ends_with('s') {
                continue;
            }
            findings.push(NativeFinding {
                kind: "path_shape".to_string(),
                native_severity: NativeSeverity::Hint,
                rule_id: "path_shape".to_string(),
                message: format!("resource segment '{resource}' in '{path}' is not pluralized"),
                location: format!("paths.{path}"),
                recommendation: "use a plural resource noun, e.g. /v1/orders".to_string(),
                affected_field_locations: Vec::new(),
            });
        }
    }
    findings
}
