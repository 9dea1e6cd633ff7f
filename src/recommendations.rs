//! Fleet-wide field naming recommendations: a post-Analyzer pass that
//! groups the fields named in findings across every service by
//! conceptual similarity and proposes one standardized name per concept.
//! Grounded on `original_source/src/core/fhir_mapper.py`'s `FHIRMapper`
//! (`generate_recommendations`/`_group_fields_by_concept`/
//! `_create_recommendation`) — the pipeline stage the original wires in
//! right after consistency analysis (`original_source/src/main.py`).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::model::{FieldRecord, ServiceOverview};

/// One entry in the reference field-concept dictionary. Grounded on
/// `FHIRMappingDictionary`'s default mappings, restricted to the subset
/// the original actually keys off field name rather than schema shape.
#[derive(Debug, Clone)]
pub struct FieldConceptMapping {
    pub concept_path: &'static str,
    pub canonical_type: &'static str,
    pub confidence: f64,
    pub description: &'static str,
    pub example: Option<&'static str>,
}

static CONCEPT_MAPPINGS: LazyLock<BTreeMap<&'static str, FieldConceptMapping>> = LazyLock::new(|| {
    let entries = [
        ("first_name", "patient.name.given", "string", 0.95, "given name", Some("John")),
        ("given_name", "patient.name.given", "string", 1.0, "given name", Some("John")),
        ("last_name", "patient.name.family", "string", 0.95, "family name", Some("Doe")),
        ("family_name", "patient.name.family", "string", 1.0, "family name", Some("Doe")),
        ("birth_date", "patient.birthDate", "date", 1.0, "birth date", Some("1990-01-01")),
        ("dob", "patient.birthDate", "date", 0.9, "birth date", Some("1990-01-01")),
        ("gender", "patient.gender", "code", 1.0, "gender", Some("male")),
        ("phone", "patient.telecom.value", "string", 0.8, "phone number", Some("+1-555-123-4567")),
        ("phone_number", "patient.telecom.value", "string", 0.9, "phone number", Some("+1-555-123-4567")),
        ("email", "patient.telecom.value", "string", 1.0, "email address", Some("john.doe@example.com")),
        ("street", "patient.address.line", "string", 0.9, "street address", Some("123 Main St")),
        ("city", "patient.address.city", "string", 1.0, "city name", Some("Springfield")),
        ("state", "patient.address.state", "string", 1.0, "state or province", Some("IL")),
        ("zip", "patient.address.postalCode", "string", 0.8, "postal code", Some("62701")),
        ("zipcode", "patient.address.postalCode", "string", 0.9, "postal code", Some("62701")),
        ("postal_code", "patient.address.postalCode", "string", 1.0, "postal code", Some("62701")),
        ("country", "patient.address.country", "string", 1.0, "country code", Some("US")),
        ("created_at", "resource.meta.lastUpdated", "instant", 0.8, "creation timestamp", Some("2023-01-01T12:00:00Z")),
        ("updated_at", "resource.meta.lastUpdated", "instant", 0.9, "last-updated timestamp", Some("2023-01-01T12:00:00Z")),
        ("version", "resource.meta.versionId", "id", 0.9, "version identifier", Some("1")),
        ("id", "resource.id", "id", 0.7, "resource identifier", Some("patient-123")),
        ("identifier", "resource.id", "id", 1.0, "resource identifier", Some("patient-123")),
        ("uuid", "resource.id", "id", 0.8, "resource identifier", Some("550e8400-e29b-41d4-a716-446655440000")),
    ];

    entries
        .into_iter()
        .map(|(name, concept_path, canonical_type, confidence, description, example)| {
            (
                name,
                FieldConceptMapping {
                    concept_path,
                    canonical_type,
                    confidence,
                    description,
                    example,
                },
            )
        })
        .collect()
});

fn normalize(name: &str) -> String {
    name.to_lowercase().replace('-', "_")
}

fn mapping_for(field_name: &str) -> Option<&'static FieldConceptMapping> {
    CONCEPT_MAPPINGS.get(normalize(field_name).as_str())
}

/// Impact level of standardizing one naming recommendation, per
/// `FHIRMapper._determine_impact_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    fn of(service_count: usize, field_count: usize) -> Self {
        if service_count >= 5 || field_count >= 10 {
            ImpactLevel::High
        } else if service_count >= 3 || field_count >= 5 {
            ImpactLevel::Medium
        } else {
            ImpactLevel::Low
        }
    }
}

/// One fleet-wide standardization recommendation for a field concept
/// used inconsistently across services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldNamingRecommendation {
    pub concept: String,
    /// Distinct field names observed for this concept across the fleet.
    pub current_usage: Vec<String>,
    pub recommended_name: String,
    pub canonical_type: String,
    pub confidence: f64,
    pub impact_level: ImpactLevel,
    pub services_affected: Vec<String>,
    pub implementation_notes: String,
}

/// Generates fleet-wide recommendations from the fields referenced by
/// every current `ServiceOverview`'s findings. Pure given its input —
/// same overviews always yield the same recommendations, the same
/// guarantee the Analyzer gives for a single service (§4.4's P2).
pub fn generate(overviews: &[ServiceOverview]) -> Vec<FieldNamingRecommendation> {
    let mut all_fields: Vec<&FieldRecord> = Vec::new();
    for overview in overviews {
        for finding in &overview.findings {
            all_fields.extend(finding.affected_fields.iter());
        }
    }

    let groups = group_by_concept(&all_fields);

    let mut recommendations: Vec<FieldNamingRecommendation> = groups
        .into_iter()
        .filter_map(|(concept, fields)| build_recommendation(&concept, &fields))
        .collect();

    recommendations.sort_by(|a, b| a.concept.cmp(&b.concept));
    recommendations
}

fn group_by_concept<'a>(fields: &[&'a FieldRecord]) -> BTreeMap<String, Vec<&'a FieldRecord>> {
    let mut groups: BTreeMap<String, Vec<&FieldRecord>> = BTreeMap::new();
    for field in fields {
        let concept = match mapping_for(&field.name) {
            Some(m) => m.concept_path.to_string(),
            None => normalize(&field.name),
        };
        groups.entry(concept).or_default().push(field);
    }
    groups
}

/// A concept with fewer than two distinct field records has nothing to
/// standardize; mirrors `_create_recommendation`'s early return.
fn build_recommendation(concept: &str, fields: &[&FieldRecord]) -> Option<FieldNamingRecommendation> {
    if fields.len() < 2 {
        return None;
    }

    let best_mapping = fields
        .iter()
        .filter_map(|f| mapping_for(&f.name))
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))?;

    let mut services_affected: Vec<String> = fields.iter().map(|f| f.service.clone()).collect();
    services_affected.sort();
    services_affected.dedup();

    let mut current_usage: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
    current_usage.sort();
    current_usage.dedup();

    let impact_level = ImpactLevel::of(services_affected.len(), fields.len());
    let recommended_name = suggest_field_name(best_mapping);
    let implementation_notes = implementation_notes(best_mapping, fields);

    Some(FieldNamingRecommendation {
        concept: concept.to_string(),
        current_usage,
        recommended_name,
        canonical_type: best_mapping.canonical_type.to_string(),
        confidence: best_mapping.confidence,
        impact_level,
        services_affected,
        implementation_notes,
    })
}

fn suggest_field_name(mapping: &FieldConceptMapping) -> String {
    mapping
        .concept_path
        .rsplit('.')
        .next()
        .unwrap_or(mapping.concept_path)
        .to_string()
}

fn implementation_notes(mapping: &FieldConceptMapping, fields: &[&FieldRecord]) -> String {
    let mut notes = vec![
        format!("standardize to {}", mapping.concept_path),
        format!("expected type: {}", mapping.canonical_type),
    ];
    if let Some(example) = mapping.example {
        notes.push(format!("example value: {example}"));
    }

    let mut types: Vec<&str> = fields.iter().map(|f| f.r#type.as_str()).collect();
    types.sort();
    types.dedup();
    if types.len() > 1 {
        notes.push(format!(
            "current types vary: {}; consider standardizing to {}",
            types.join(", "),
            mapping.canonical_type
        ));
    }

    let required_count = fields.iter().filter(|f| f.required).count();
    if required_count > 0 && required_count < fields.len() {
        notes.push("consider making this field consistently required or optional across all services".to_string());
    }

    notes.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Finding, FindingKind, Severity};

    fn field(name: &str, r#type: &str, required: bool, service: &str) -> FieldRecord {
        FieldRecord {
            name: name.to_string(),
            r#type: r#type.to_string(),
            format: None,
            required,
            description: None,
            service: service.to_string(),
            namespace: "default".to_string(),
            location: format!("components.schemas.Patient.properties.{name}"),
        }
    }

    fn overview_with_fields(service: &str, fields: Vec<FieldRecord>) -> ServiceOverview {
        ServiceOverview {
            service: service.to_string(),
            namespace: "default".to_string(),
            total_endpoints: 1,
            naming_issue_count: 1,
            error_issue_count: 0,
            compliance_score: 80.0,
            findings: vec![Finding {
                kind: FindingKind::Naming,
                severity: Severity::Minor,
                rule_id: "naming_convention".to_string(),
                message: "m".to_string(),
                location: "l".to_string(),
                line_hint: None,
                affected_fields: fields,
                recommendation: "r".to_string(),
            }],
            analyzed_at: chrono::Utc::now(),
            source_url: "http://example".to_string(),
            rule_set_version: "v1".to_string(),
        }
    }

    #[test]
    fn groups_inconsistent_field_names_into_one_recommendation() {
        let overviews = vec![
            overview_with_fields("orders", vec![field("last_name", "string", true, "orders")]),
            overview_with_fields("patients", vec![field("family_name", "string", false, "patients")]),
        ];

        let recs = generate(&overviews);
        assert_eq!(recs.len(), 1);
        let rec = &recs[0];
        assert_eq!(rec.concept, "patient.name.family");
        assert_eq!(rec.recommended_name, "family");
        assert!(rec.current_usage.contains(&"last_name".to_string()));
        assert!(rec.current_usage.contains(&"family_name".to_string()));
        assert_eq!(rec.services_affected.len(), 2);
        assert_eq!(rec.impact_level, ImpactLevel::Low);
    }

    #[test]
    fn single_field_concept_yields_no_recommendation() {
        let overviews = vec![overview_with_fields("orders", vec![field("family_name", "string", true, "orders")])];
        assert!(generate(&overviews).is_empty());
    }

    #[test]
    fn unmapped_field_is_skipped_without_a_mapping() {
        let overviews = vec![overview_with_fields(
            "orders",
            vec![field("widget_count", "integer", true, "orders"), field("widgetCount", "integer", true, "orders")],
        )];
        // Two distinct names but no FHIR mapping for either -> no best_mapping -> no recommendation.
        assert!(generate(&overviews).is_empty());
    }

    #[test]
    fn impact_level_scales_with_services_affected() {
        let overviews: Vec<ServiceOverview> = (0..5)
            .map(|i| {
                let service = format!("svc{i}");
                overview_with_fields(&service, vec![field("dob", "string", true, &service)])
            })
            .collect();

        let recs = generate(&overviews);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].impact_level, ImpactLevel::High);
    }

    #[test]
    fn recommendations_are_deterministic() {
        let overviews = vec![
            overview_with_fields("orders", vec![field("last_name", "string", true, "orders")]),
            overview_with_fields("patients", vec![field("family_name", "string", false, "patients")]),
        ];
        let r1 = generate(&overviews);
        let r2 = generate(&overviews);
        assert_eq!(r1.len(), r2.len());
        assert_eq!(r1[0].concept, r2[0].concept);
    }
}
