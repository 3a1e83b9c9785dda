use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::{FindingKind, Urgency};

use super::aggregate::CRITICAL_SEVERITY_THRESHOLD;
use super::types::{AnomalyReport, Finding};

/// Emergency protocol handler for critical findings.
pub struct EmergencyProtocol;

impl EmergencyProtocol {
    /// Project the critical findings of a report into alert payloads for the
    /// alerting service, in report order.
    pub fn process(report: &AnomalyReport) -> Vec<EmergencyAction> {
        report
            .findings
            .iter()
            .filter(|f| f.is_critical || f.severity >= CRITICAL_SEVERITY_THRESHOLD)
            .map(|finding| Self::action_for(report.patient_id, finding))
            .collect()
    }

    fn action_for(patient_id: Uuid, finding: &Finding) -> EmergencyAction {
        let (action_type, acknowledgement_prompt) = match finding.kind {
            FindingKind::CriticalValue => (
                EmergencyActionType::CriticalValue,
                "Critical result communicated to the responsible clinician",
            ),
            FindingKind::DrugInteraction => (
                EmergencyActionType::DrugInteraction,
                "Interaction reviewed with prescriber or pharmacist",
            ),
            _ => (
                EmergencyActionType::Other,
                "Finding reviewed by the responsible clinician",
            ),
        };

        EmergencyAction {
            patient_id,
            finding_id: finding.id.clone(),
            action_type,
            banner: finding.title.clone(),
            alert_message: finding.message.clone(),
            recommendation: finding.recommendation.clone(),
            urgency: finding.urgency,
            timeline: finding.urgency.timeline().to_string(),
            page_on_call: finding.urgency == Urgency::Immediate,
            acknowledgement_steps: 2,
            acknowledgement_prompt: acknowledgement_prompt.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAction {
    pub patient_id: Uuid,
    pub finding_id: String,
    pub action_type: EmergencyActionType,
    /// Short text for the alert banner.
    pub banner: String,
    pub alert_message: String,
    pub recommendation: String,
    pub urgency: Urgency,
    pub timeline: String,
    /// Whether the alert must page the on-call clinician.
    pub page_on_call: bool,
    /// Number of acknowledgement steps required (always 2 for critical findings).
    pub acknowledgement_steps: u8,
    pub acknowledgement_prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyActionType {
    CriticalValue,
    DrugInteraction,
    Other,
}
