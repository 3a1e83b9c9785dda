use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::enums::{
    FindingKind, RangeVerdict, RiskCategory, TrendDirection, UnscoredReason, Urgency,
};
use crate::models::PatientContext;

// ---------------------------------------------------------------------------
// Layers
// ---------------------------------------------------------------------------

pub const LAYER_RANGE_CHECK: u8 = 1;
pub const LAYER_CRITICAL_VALUE: u8 = 2;
pub const LAYER_AGE_ADJUSTED: u8 = 3;
pub const LAYER_MEDICATION_CONTEXT: u8 = 4;
pub const LAYER_TREND: u8 = 5;
pub const LAYER_COMORBIDITY: u8 = 6;
pub const LAYER_DRUG_INTERACTION: u8 = 7;

/// Summary key for a layer, as it appears in `layer_summaries`.
pub fn layer_key(layer: u8) -> &'static str {
    match layer {
        LAYER_RANGE_CHECK => "layer_1_range_check",
        LAYER_CRITICAL_VALUE => "layer_2_critical_values",
        LAYER_AGE_ADJUSTED => "layer_3_age_adjusted",
        LAYER_MEDICATION_CONTEXT => "layer_4_medication_context",
        LAYER_TREND => "layer_5_trend_analysis",
        LAYER_COMORBIDITY => "layer_6_comorbidity_patterns",
        LAYER_DRUG_INTERACTION => "layer_7_drug_interactions",
        _ => "layer_unknown",
    }
}

pub fn layer_name(layer: u8) -> &'static str {
    match layer {
        LAYER_RANGE_CHECK => "Range Check",
        LAYER_CRITICAL_VALUE => "Critical Value Detection",
        LAYER_AGE_ADJUSTED => "Age-Adjusted Reference",
        LAYER_MEDICATION_CONTEXT => "Medication Context",
        LAYER_TREND => "Trend Analysis",
        LAYER_COMORBIDITY => "Comorbidity Pattern Detection",
        LAYER_DRUG_INTERACTION => "Drug Interaction Check",
        _ => "Unknown Layer",
    }
}

// ---------------------------------------------------------------------------
// Finding
// ---------------------------------------------------------------------------

/// One anomaly produced by a single layer evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Report-scoped id (`ANO_001`, ...). Empty until the aggregator orders the findings.
    #[serde(rename = "anomaly_id")]
    pub id: String,
    #[serde(rename = "layer")]
    pub origin_layer: u8,
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub severity: u8,
    pub is_critical: bool,
    pub title: String,
    #[serde(rename = "description")]
    pub message: String,
    pub recommendation: String,
    pub urgency: Urgency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_biomarker: Option<AffectedBiomarker>,
    pub evidence: Evidence,
}

impl Finding {
    /// Key identifying the underlying source, used to collapse findings from
    /// several layers about the same reading when counting.
    pub fn source_key(&self) -> String {
        self.evidence.source_key()
    }
}

/// Display detail for findings derived from a single reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedBiomarker {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub normal_range: String,
    pub deviation: String,
}

/// What a finding was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Evidence {
    Reading {
        biomarker_type: String,
        value: f64,
        unit: String,
        observed_at: NaiveDateTime,
        verdict: RangeVerdict,
    },
    Trend {
        biomarker_type: String,
        previous_value: f64,
        previous_at: NaiveDateTime,
        current_value: f64,
        current_at: NaiveDateTime,
        pct_change: f64,
        direction: TrendDirection,
    },
    MedicationContext {
        biomarker_type: String,
        value: f64,
        observed_at: NaiveDateTime,
        medications: Vec<String>,
        underlying_layer: u8,
        underlying_severity: u8,
    },
    Diagnoses {
        pattern: String,
        diagnoses: Vec<String>,
    },
    DrugPair {
        drug_a: String,
        drug_b: String,
        tier: String,
    },
}

impl Evidence {
    pub fn source_key(&self) -> String {
        match self {
            Self::Reading {
                biomarker_type,
                value,
                observed_at,
                ..
            } => format!("reading:{biomarker_type}:{observed_at}:{value}"),
            Self::Trend {
                biomarker_type,
                current_at,
                ..
            } => format!("trend:{biomarker_type}:{current_at}"),
            Self::MedicationContext {
                biomarker_type,
                observed_at,
                ..
            } => format!("medication:{biomarker_type}:{observed_at}"),
            Self::Diagnoses { pattern, .. } => format!("pattern:{pattern}"),
            Self::DrugPair { drug_a, drug_b, .. } => {
                let (a, b) = if drug_a <= drug_b {
                    (drug_a, drug_b)
                } else {
                    (drug_b, drug_a)
                };
                format!("interaction:{a}:{b}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityAction {
    pub priority: u32,
    pub action: String,
    pub timeline: String,
    pub urgency: Urgency,
    pub finding_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub layer: u8,
    pub name: String,
    pub count: usize,
    pub findings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatientSummary {
    pub total_anomalies: usize,
    pub critical_count: usize,
    pub high_severity_count: usize,
    pub moderate_severity_count: usize,
    pub key_concerns: Vec<String>,
}

/// An input item skipped because reference data could not score it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnscoredItem {
    pub item: String,
    pub reason: UnscoredReason,
    pub detail: String,
}

/// Prioritized, severity-scored anomaly report for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub patient_id: Uuid,
    pub generated_at: NaiveDateTime,
    pub overall_severity: u8,
    pub risk_category: RiskCategory,
    #[serde(rename = "has_critical_alerts")]
    pub has_critical_alert: bool,
    #[serde(rename = "anomalies")]
    pub findings: Vec<Finding>,
    #[serde(rename = "priority_actions")]
    pub prioritized_actions: Vec<PriorityAction>,
    pub layer_summaries: BTreeMap<String, LayerSummary>,
    pub patient_summary: PatientSummary,
    pub unscored: Vec<UnscoredItem>,
}

impl AnomalyReport {
    pub fn critical_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_critical)
    }

    pub fn findings_from_layer(&self, layer: u8) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.origin_layer == layer)
    }
}

// ---------------------------------------------------------------------------
// Evaluator trait
// ---------------------------------------------------------------------------

/// Turns one patient snapshot into a scored anomaly report.
pub trait AnomalyEvaluator: Send + Sync {
    /// Evaluate with an explicit report timestamp. Same input and tables give
    /// an identical report.
    fn evaluate_at(
        &self,
        context: &PatientContext,
        generated_at: NaiveDateTime,
    ) -> Result<AnomalyReport, EngineError>;

    /// Evaluate as of the current local time.
    fn evaluate(&self, context: &PatientContext) -> Result<AnomalyReport, EngineError> {
        self.evaluate_at(context, chrono::Local::now().naive_local())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reference-table problems. Everything except `UnknownBiomarkerType` is a
/// configuration error and is fatal at load time.
#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Reference data load failed ({0}): {1}")]
    Load(String, String),

    #[error("Reference data parse failed ({0}): {1}")]
    Parse(String, String),

    #[error("Invalid range for {biomarker}: {reason}")]
    InvalidRange { biomarker: String, reason: String },

    #[error("Invalid age bands for {biomarker}: {reason}")]
    InvalidAgeBands { biomarker: String, reason: String },

    #[error("Interaction rule {drug1} + {drug2}: {reason}")]
    InvalidInteraction {
        drug1: String,
        drug2: String,
        reason: String,
    },

    #[error("Unknown interaction tier '{0}'")]
    UnknownTier(String),

    #[error("Invalid interaction tier '{tier}': {reason}")]
    InvalidTier { tier: String, reason: String },

    #[error("Invalid comorbidity pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Unknown biomarker type: {0}")]
    UnknownBiomarkerType(String),
}

impl ReferenceError {
    /// Whether this error must stop the engine from starting.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, Self::UnknownBiomarkerType(_))
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Reference configuration error: {0}")]
    Configuration(#[from] ReferenceError),

    #[error("Internal lock failed")]
    LockFailed,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn drug_pair_key_is_order_independent() {
        let ab = Evidence::DrugPair {
            drug_a: "warfarin".into(),
            drug_b: "aspirin".into(),
            tier: "high".into(),
        };
        let ba = Evidence::DrugPair {
            drug_a: "aspirin".into(),
            drug_b: "warfarin".into(),
            tier: "high".into(),
        };
        assert_eq!(ab.source_key(), ba.source_key());
    }

    #[test]
    fn reading_key_ignores_verdict() {
        let high = Evidence::Reading {
            biomarker_type: "glucose".into(),
            value: 425.0,
            unit: "mg/dL".into(),
            observed_at: at(),
            verdict: RangeVerdict::High,
        };
        let mut other = high.clone();
        if let Evidence::Reading { verdict, .. } = &mut other {
            *verdict = RangeVerdict::Normal;
        }
        assert_eq!(high.source_key(), other.source_key());
    }

    #[test]
    fn unknown_biomarker_is_not_configuration_error() {
        assert!(!ReferenceError::UnknownBiomarkerType("x".into()).is_configuration_error());
        assert!(ReferenceError::UnknownTier("severe".into()).is_configuration_error());
    }

    #[test]
    fn layer_keys_are_distinct() {
        let keys: std::collections::HashSet<_> = (1..=7).map(layer_key).collect();
        assert_eq!(keys.len(), 7);
    }
}
