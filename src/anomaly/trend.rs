use thiserror::Error;

use crate::models::enums::{FindingKind, TrendDirection};
use crate::models::{BiomarkerReading, PatientContext};

use super::detection::EvaluationSnapshot;
use super::helpers::{display_biomarker, to_score, urgency_for_severity};
use super::messages::MessageTemplates;
use super::types::{Evidence, Finding, LAYER_TREND};

/// Absolute percentage change a trend must exceed to be reported.
pub const TREND_THRESHOLD_PCT: f64 = 20.0;

/// Why no trend could be computed for a reading. Never surfaced to callers.
#[derive(Error, Debug, PartialEq)]
pub enum TrendError {
    #[error("No earlier reading for {0}")]
    NoBaseline(String),

    #[error("Baseline value for {0} is zero")]
    ZeroBaseline(String),

    #[error("Unit mismatch for {biomarker}: '{previous}' then '{current}'")]
    UnitMismatch {
        biomarker: String,
        previous: String,
        current: String,
    },
}

/// Change between two readings of the same biomarker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendChange {
    pub pct_change: f64,
    pub direction: TrendDirection,
}

impl TrendChange {
    pub fn exceeds_threshold(&self) -> bool {
        self.pct_change.abs() > TREND_THRESHOLD_PCT
    }

    pub fn severity(&self) -> u8 {
        to_score(self.pct_change.abs().min(100.0))
    }
}

/// Latest historical reading strictly before `current`.
pub fn baseline_for<'a>(
    context: &'a PatientContext,
    current: &BiomarkerReading,
) -> Option<&'a BiomarkerReading> {
    let series = context.history_for(&current.biomarker_type);
    let earlier = series.partition_point(|r| r.observed_at < current.observed_at);
    earlier.checked_sub(1).map(|i| &series[i])
}

/// `(current - previous) / |previous| * 100`.
pub fn compute_change(
    previous: &BiomarkerReading,
    current: &BiomarkerReading,
) -> Result<TrendChange, TrendError> {
    if !previous.unit.is_empty()
        && !current.unit.is_empty()
        && !previous.unit.eq_ignore_ascii_case(&current.unit)
    {
        return Err(TrendError::UnitMismatch {
            biomarker: current.biomarker_type.clone(),
            previous: previous.unit.clone(),
            current: current.unit.clone(),
        });
    }
    if previous.value == 0.0 {
        return Err(TrendError::ZeroBaseline(current.biomarker_type.clone()));
    }

    let pct_change = (current.value - previous.value) / previous.value.abs() * 100.0;
    let direction = if pct_change >= 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };
    Ok(TrendChange {
        pct_change,
        direction,
    })
}

fn trend_for(context: &PatientContext, current: &BiomarkerReading) -> Result<Option<Finding>, TrendError> {
    let previous = baseline_for(context, current)
        .ok_or_else(|| TrendError::NoBaseline(current.biomarker_type.clone()))?;
    let change = compute_change(previous, current)?;
    if !change.exceeds_threshold() {
        return Ok(None);
    }

    let name = display_biomarker(&current.biomarker_type);
    let severity = change.severity();
    let increasing = change.direction == TrendDirection::Increasing;

    Ok(Some(Finding {
        id: String::new(),
        origin_layer: LAYER_TREND,
        kind: FindingKind::TrendDeviation,
        severity,
        is_critical: false,
        title: MessageTemplates::trend_title(&name, increasing),
        message: MessageTemplates::trend(
            &name,
            previous.value,
            current.value,
            &current.unit,
            change.pct_change,
        ),
        recommendation: MessageTemplates::trend_recommendation(&name),
        urgency: urgency_for_severity(severity),
        affected_biomarker: None,
        evidence: Evidence::Trend {
            biomarker_type: current.biomarker_type.clone(),
            previous_value: previous.value,
            previous_at: previous.observed_at,
            current_value: current.value,
            current_at: current.observed_at,
            pct_change: change.pct_change,
            direction: change.direction,
        },
    }))
}

/// Latest current reading per scored biomarker type, in first-seen order.
/// Equal timestamps resolve to the later reading in input order.
fn latest_per_type<'a>(snapshot: &EvaluationSnapshot<'a>) -> Vec<&'a BiomarkerReading> {
    let mut latest: Vec<&'a BiomarkerReading> = Vec::new();
    for scored in &snapshot.readings {
        let reading = scored.reading;
        match latest
            .iter_mut()
            .find(|r| r.biomarker_type == reading.biomarker_type)
        {
            Some(slot) => {
                if reading.observed_at >= slot.observed_at {
                    *slot = reading;
                }
            }
            None => latest.push(reading),
        }
    }
    latest
}

/// Layer 5: for each scored biomarker type, compare its latest current reading
/// with the most recent earlier reading of that type. Types without a usable
/// baseline are skipped. Unscored types never reach this layer.
pub fn detect_trends(snapshot: &EvaluationSnapshot<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();

    for current in latest_per_type(snapshot) {
        match trend_for(snapshot.context, current) {
            Ok(Some(finding)) => findings.push(finding),
            Ok(None) => {}
            Err(TrendError::NoBaseline(_)) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Trend skipped");
            }
        }
    }

    findings
}
