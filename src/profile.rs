//! Optional domain schema profile: checks extracted fields against a
//! named set of expected fields for specific schemas (e.g. a `Patient`
//! schema expected to carry FHIR-shaped identifiers). Grounded on
//! `original_source/src/core/fhir_compliance.py`'s
//! `FHIRComplianceChecker` and `FHIRFieldRequirement`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GovernanceError, Result};

/// One expectation: a schema named `schema_name` should have a field
/// named `field_name` of `expected_type`, required or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRequirement {
    pub schema_name: String,
    pub field_name: String,
    pub required: bool,
    pub expected_type: String,
}

/// A violation of one `FieldRequirement`.
#[derive(Debug, Clone)]
pub struct ProfileViolation {
    pub schema_name: String,
    pub field_name: String,
    pub message: String,
    pub location: String,
    pub recommendation: String,
}

/// A named collection of field requirements. When no profile is
/// configured this pass is a no-op — `Non-goals` in the specification do
/// not exclude it, it is simply optional.
#[derive(Debug, Clone, Default)]
pub struct DomainProfile {
    requirements: Vec<FieldRequirement>,
}

impl DomainProfile {
    pub fn new(requirements: Vec<FieldRequirement>) -> Self {
        Self { requirements }
    }

    pub async fn from_file(path: &std::path::Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            GovernanceError::ProcessFatal(format!("reading domain profile {path:?} failed: {e}"))
        })?;
        let requirements: Vec<FieldRequirement> = serde_json::from_slice(&bytes).map_err(|e| {
            GovernanceError::ProcessFatal(format!("parsing domain profile {path:?} failed: {e}"))
        })?;
        Ok(Self::new(requirements))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Checks a document's `components.schemas` against the configured
    /// requirements, grouping by schema name.
    pub fn check(&self, content: &Value) -> Vec<ProfileViolation> {
        if self.requirements.is_empty() {
            return Vec::new();
        }

        let mut by_schema: HashMap<&str, Vec<&FieldRequirement>> = HashMap::new();
        for req in &self.requirements {
            by_schema.entry(req.schema_name.as_str()).or_default().push(req);
        }

        let mut violations = Vec::new();
        let Some(schemas) = content.pointer("/components/schemas").and_then(Value::as_object) else {
            return violations;
        };

        for (schema_name, reqs) in by_schema {
            let Some(schema) = schemas.get(schema_name) else {
                continue;
            };
            let properties = schema.get("properties").and_then(Value::as_object);
            let required: Vec<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            for req in reqs {
                let location = format!("components.schemas.{schema_name}.properties.{}", req.field_name);
                match properties.and_then(|p| p.get(req.field_name.as_str())) {
                    None => violations.push(ProfileViolation {
                        schema_name: schema_name.to_string(),
                        field_name: req.field_name.clone(),
                        message: format!(
                            "schema '{schema_name}' is missing expected field '{}'",
                            req.field_name
                        ),
                        location,
                        recommendation: format!(
                            "add '{}' of type '{}' to schema '{schema_name}'",
                            req.field_name, req.expected_type
                        ),
                    }),
                    Some(field_def) => {
                        let actual_type = field_def.get("type").and_then(Value::as_str).unwrap_or("unknown");
                        if actual_type != req.expected_type {
                            violations.push(ProfileViolation {
                                schema_name: schema_name.to_string(),
                                field_name: req.field_name.clone(),
                                message: format!(
                                    "field '{}' in '{schema_name}' has type '{actual_type}', expected '{}'",
                                    req.field_name, req.expected_type
                                ),
                                location: location.clone(),
                                recommendation: format!("change '{}' to type '{}'", req.field_name, req.expected_type),
                            });
                        }
                        if req.required && !required.contains(&req.field_name.as_str()) {
                            violations.push(ProfileViolation {
                                schema_name: schema_name.to_string(),
                                field_name: req.field_name.clone(),
                                message: format!(
                                    "field '{}' in '{schema_name}' should be required by the domain profile",
                                    req.field_name
                                ),
                                location,
                                recommendation: format!("mark '{}' as required", req.field_name),
                            });
                        }
                    }
                }
            }
        }

        violations
    }
}
