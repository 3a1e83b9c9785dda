use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use uuid::Uuid;

use super::helpers::risk_category;
use super::types::*;

/// Overall severity at or above which a report raises a critical alert.
pub const CRITICAL_SEVERITY_THRESHOLD: u8 = 81;

/// Findings at or above this severity become priority actions.
pub const ACTION_SEVERITY_THRESHOLD: u8 = 61;

const MODERATE_SEVERITY_THRESHOLD: u8 = 41;
const KEY_CONCERN_LIMIT: usize = 3;

/// Merge every layer's findings into one ordered report. Never fails: an
/// empty finding list is a valid minimal-risk report.
pub fn aggregate(
    patient_id: Uuid,
    generated_at: NaiveDateTime,
    mut findings: Vec<Finding>,
    unscored: Vec<UnscoredItem>,
) -> AnomalyReport {
    order_findings(&mut findings);
    assign_ids(&mut findings);

    let overall_severity = findings.iter().map(|f| f.severity).max().unwrap_or(0);
    let has_critical_alert =
        findings.iter().any(|f| f.is_critical) || overall_severity >= CRITICAL_SEVERITY_THRESHOLD;

    AnomalyReport {
        patient_id,
        generated_at,
        overall_severity,
        risk_category: risk_category(overall_severity),
        has_critical_alert,
        prioritized_actions: prioritize_actions(&findings),
        layer_summaries: summarize_layers(&findings),
        patient_summary: summarize_patient(&findings),
        findings,
        unscored,
    }
}

/// Severity desc, critical first, lower layer first, then input order.
pub fn order_findings(findings: &mut [Finding]) {
    // sort_by is stable, which supplies the final tie-break.
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.is_critical.cmp(&a.is_critical))
            .then_with(|| a.origin_layer.cmp(&b.origin_layer))
    });
}

fn assign_ids(findings: &mut [Finding]) {
    for (i, finding) in findings.iter_mut().enumerate() {
        finding.id = format!("ANO_{:03}", i + 1);
    }
}

/// Critical or high-severity findings, most urgent first, one action per
/// distinct recommendation.
pub fn prioritize_actions(findings: &[Finding]) -> Vec<PriorityAction> {
    let mut candidates: Vec<&Finding> = findings
        .iter()
        .filter(|f| f.is_critical || f.severity >= ACTION_SEVERITY_THRESHOLD)
        .collect();
    candidates.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.urgency.cmp(&b.urgency))
    });

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut actions = Vec::new();
    for finding in candidates {
        if !seen.insert(finding.recommendation.as_str()) {
            continue;
        }
        actions.push(PriorityAction {
            priority: actions.len() as u32 + 1,
            action: finding.recommendation.clone(),
            timeline: finding.urgency.timeline().to_string(),
            urgency: finding.urgency,
            finding_id: finding.id.clone(),
        });
    }
    actions
}

/// One entry per layer, including layers with no findings.
pub fn summarize_layers(findings: &[Finding]) -> BTreeMap<String, LayerSummary> {
    (LAYER_RANGE_CHECK..=LAYER_DRUG_INTERACTION)
        .map(|layer| {
            let titles: Vec<String> = findings
                .iter()
                .filter(|f| f.origin_layer == layer)
                .map(|f| f.title.clone())
                .collect();
            let summary = LayerSummary {
                layer,
                name: layer_name(layer).to_string(),
                count: titles.len(),
                findings: titles,
            };
            (layer_key(layer).to_string(), summary)
        })
        .collect()
}

/// Severity counts are taken once per evidence source, at that source's
/// highest severity, so one reading flagged by two layers counts once.
pub fn summarize_patient(findings: &[Finding]) -> PatientSummary {
    let mut sources: BTreeMap<String, (u8, bool)> = BTreeMap::new();
    for finding in findings {
        let entry = sources.entry(finding.source_key()).or_insert((0, false));
        entry.0 = entry.0.max(finding.severity);
        entry.1 |= finding.is_critical;
    }

    let mut summary = PatientSummary {
        total_anomalies: findings.len(),
        ..Default::default()
    };
    for (severity, critical) in sources.into_values() {
        if critical || severity >= CRITICAL_SEVERITY_THRESHOLD {
            summary.critical_count += 1;
        } else if severity >= ACTION_SEVERITY_THRESHOLD {
            summary.high_severity_count += 1;
        } else if severity >= MODERATE_SEVERITY_THRESHOLD {
            summary.moderate_severity_count += 1;
        }
    }

    for finding in findings {
        if summary.key_concerns.len() == KEY_CONCERN_LIMIT {
            break;
        }
        if !summary.key_concerns.contains(&finding.title) {
            summary.key_concerns.push(finding.title.clone());
        }
    }

    summary
}
