//! Operator-facing report rendering for the `check`/`report` CLI commands.
//! Grounded on `original_source/src/core/consistency_analyzer.py`'s
//! `ReportGenerator` (`generate_markdown_report`/`generate_json_report`),
//! translated to the fleet-level `FleetSummary`/`ServiceOverview` shape.

use serde_json::json;

use crate::model::{FleetSummary, ServiceOverview};
use crate::recommendations::FieldNamingRecommendation;

pub fn render_text(summary: &FleetSummary, overviews: &[ServiceOverview], recommendations: &[FieldNamingRecommendation]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Fleet compliance: {} services, average score {:.1}\n",
        summary.total_services, summary.average_score
    ));
    out.push_str(&format!(
        "  critical={} major={} minor={} info={}\n",
        summary.critical_issues, summary.major_issues, summary.minor_issues, summary.info_issues
    ));
    out.push_str(&format!(
        "  bands: high={} medium={} low={}\n\n",
        summary.high_band, summary.medium_band, summary.low_band
    ));

    let mut sorted: Vec<&ServiceOverview> = overviews.iter().collect();
    sorted.sort_by(|a, b| a.compliance_score.partial_cmp(&b.compliance_score).unwrap());

    for overview in sorted {
        out.push_str(&format!(
            "{}/{}: score={:.1} endpoints={} findings={}\n",
            overview.namespace,
            overview.service,
            overview.compliance_score,
            overview.total_endpoints,
            overview.findings.len()
        ));
        for finding in &overview.findings {
            out.push_str(&format!(
                "  [{:?}/{:?}] {} ({})\n",
                finding.severity, finding.kind, finding.message, finding.location
            ));
        }
    }

    if !recommendations.is_empty() {
        out.push_str("\nField naming recommendations:\n");
        for rec in recommendations {
            out.push_str(&format!(
                "  {} -> {} ({:?} impact, used as {})\n",
                rec.concept,
                rec.recommended_name,
                rec.impact_level,
                rec.current_usage.join(", ")
            ));
        }
    }

    out
}

pub fn render_json(summary: &FleetSummary, overviews: &[ServiceOverview], recommendations: &[FieldNamingRecommendation]) -> String {
    let value = json!({
        "generated_at": summary.generated_at,
        "summary": {
            "total_services": summary.total_services,
            "average_score": summary.average_score,
            "critical_issues": summary.critical_issues,
            "major_issues": summary.major_issues,
            "minor_issues": summary.minor_issues,
            "info_issues": summary.info_issues,
            "high_band": summary.high_band,
            "medium_band": summary.medium_band,
            "low_band": summary.low_band,
        },
        "services": overviews,
        "recommendations": recommendations,
    });
    serde_json::to_string_pretty(&value).expect("report value is serializable")
}

pub fn render_markdown(summary: &FleetSummary, overviews: &[ServiceOverview], recommendations: &[FieldNamingRecommendation]) -> String {
    let mut md = format!(
        "# API Governance Report\n\n**Generated:** {}\n**Services analyzed:** {}\n**Average score:** {:.1}\n\n",
        summary.generated_at, summary.total_services, summary.average_score
    );

    md.push_str("## Summary\n\n| Severity | Count |\n|----------|-------|\n");
    md.push_str(&format!("| Critical | {} |\n", summary.critical_issues));
    md.push_str(&format!("| Major | {} |\n", summary.major_issues));
    md.push_str(&format!("| Minor | {} |\n", summary.minor_issues));
    md.push_str(&format!("| Info | {} |\n", summary.info_issues));

    md.push_str("\n## Services\n\n");
    let mut sorted: Vec<&ServiceOverview> = overviews.iter().collect();
    sorted.sort_by(|a, b| a.compliance_score.partial_cmp(&b.compliance_score).unwrap());

    for overview in sorted {
        md.push_str(&format!(
            "### {}/{} — {:.1}\n\n",
            overview.namespace, overview.service, overview.compliance_score
        ));
        for finding in &overview.findings {
            md.push_str(&format!(
                "- **{:?}** ({:?}) at `{}`: {} — {}\n",
                finding.severity, finding.kind, finding.location, finding.message, finding.recommendation
            ));
        }
        md.push('\n');
    }

    if !recommendations.is_empty() {
        md.push_str("## Field Naming Recommendations\n\n");
        for rec in recommendations {
            md.push_str(&format!(
                "- **{}** -> `{}` ({:?} impact, affects {}): currently used as {}\n",
                rec.concept,
                rec.recommended_name,
                rec.impact_level,
                rec.services_affected.join(", "),
                rec.current_usage.join(", ")
            ));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn empty_summary() -> FleetSummary {
        FleetSummary {
            total_services: 0,
            average_score: 0.0,
            critical_issues: 0,
            major_issues: 0,
            minor_issues: 0,
            info_issues: 0,
            high_band: 0,
            medium_band: 0,
            low_band: 0,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn text_report_of_empty_fleet_mentions_zero_services() {
        let text = render_text(&empty_summary(), &[], &[]);
        assert!(text.contains("0 services"));
    }

    #[test]
    fn json_report_round_trips_through_serde() {
        let json_str = render_json(&empty_summary(), &[], &[]);
        let value: serde_json::Value = serde_json::from_str(&json_str).unwrap();
        assert_eq!(value["summary"]["total_services"], 0);
        assert_eq!(value["recommendations"], serde_json::json!([]));
    }

    #[test]
    fn markdown_report_has_summary_table() {
        let md = render_markdown(&empty_summary(), &[], &[]);
        assert!(md.contains("| Severity | Count |"));
    }

    #[test]
    fn text_report_lists_recommendations_when_present() {
        let rec = FieldNamingRecommendation {
            concept: "patient.name.family".to_string(),
            current_usage: vec!["last_name".to_string(), "family_name".to_string()],
            recommended_name: "family".to_string(),
            canonical_type: "string".to_string(),
            confidence: 1.0,
            impact_level: crate::recommendations::ImpactLevel::Low,
            services_affected: vec!["orders".to_string(), "patients".to_string()],
            implementation_notes: "standardize to patient.name.family".to_string(),
        };
        let text = render_text(&empty_summary(), &[], &[rec]);
        assert!(text.contains("patient.name.family -> family"));
    }
}
