use crate::models::enums::{RangeVerdict, RiskCategory, Urgency};
use crate::models::BiomarkerReading;

use super::reference::ResolvedRange;
use super::types::AffectedBiomarker;

/// Severity assigned when the violated edge and its critical threshold coincide.
pub const NO_CRITICAL_REFERENCE_SEVERITY: u8 = 50;

/// Clamp to [0, 100] and truncate toward zero.
pub fn to_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.clamp(0.0, 100.0) as u8
}

/// Critical threshold used when none is configured for the violated side.
///
/// Strictly positive ranges use `max * 2` and `min / 2`. Ranges that reach
/// zero or below step one range width past the violated edge, so the proxy
/// always lies outside the normal range.
pub fn proxy_critical(range: &ResolvedRange, verdict: RangeVerdict) -> f64 {
    let width = range.normal_max - range.normal_min;
    match verdict {
        RangeVerdict::Low if range.normal_min > 0.0 => range.normal_min / 2.0,
        RangeVerdict::Low => range.normal_min - width,
        _ if range.normal_min > 0.0 => range.normal_max * 2.0,
        _ => range.normal_max + width,
    }
}

/// `100 * |value - boundary| / |critical - boundary|`, clamped.
pub fn range_severity(value: f64, boundary: f64, critical_boundary: f64) -> u8 {
    let span = (critical_boundary - boundary).abs();
    if span <= f64::EPSILON {
        return NO_CRITICAL_REFERENCE_SEVERITY;
    }
    to_score(100.0 * (value - boundary).abs() / span)
}

/// Violated edge of `range` for an abnormal verdict.
pub fn violated_boundary(range: &ResolvedRange, verdict: RangeVerdict) -> f64 {
    match verdict {
        RangeVerdict::Low => range.normal_min,
        _ => range.normal_max,
    }
}

/// Deviation severity of `value` against `range`. Zero when within range.
pub fn deviation_severity(value: f64, range: &ResolvedRange) -> u8 {
    let verdict = range.verdict(value);
    if !verdict.is_abnormal() {
        return 0;
    }
    let boundary = violated_boundary(range, verdict);
    let critical = match verdict {
        RangeVerdict::Low => range.critical_low,
        _ => range.critical_high,
    }
    .unwrap_or_else(|| proxy_critical(range, verdict));

    range_severity(value, boundary, critical)
}

/// Five buckets, inclusive and non-overlapping.
pub fn risk_category(severity: u8) -> RiskCategory {
    match severity {
        0..=20 => RiskCategory::Minimal,
        21..=40 => RiskCategory::Low,
        41..=60 => RiskCategory::Moderate,
        61..=80 => RiskCategory::High,
        _ => RiskCategory::Critical,
    }
}

/// Urgency for findings without a table-driven urgency.
pub fn urgency_for_severity(severity: u8) -> Urgency {
    match risk_category(severity) {
        RiskCategory::Critical => Urgency::Immediate,
        RiskCategory::High => Urgency::Urgent,
        RiskCategory::Moderate => Urgency::Soon,
        RiskCategory::Low => Urgency::Routine,
        RiskCategory::Minimal => Urgency::Monitoring,
    }
}

/// Signed deviation relative to the violated boundary, e.g. `+325%`.
pub fn format_deviation(value: f64, boundary: f64) -> String {
    if boundary.abs() <= f64::EPSILON {
        return format!("{:+}", value - boundary);
    }
    let pct = (value - boundary) / boundary.abs() * 100.0;
    format!("{:+.0}%", pct)
}

/// `glucose_fasting` -> `Glucose Fasting`.
pub fn display_biomarker(biomarker_type: &str) -> String {
    biomarker_type
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-insensitive keyword containment.
pub fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    haystack.to_lowercase().contains(&keyword.to_lowercase())
}

pub fn affected_biomarker(
    reading: &BiomarkerReading,
    range: &ResolvedRange,
    verdict: RangeVerdict,
) -> AffectedBiomarker {
    let deviation = if verdict.is_abnormal() {
        format_deviation(reading.value, violated_boundary(range, verdict))
    } else {
        "0%".to_string()
    };

    AffectedBiomarker {
        name: display_biomarker(&reading.biomarker_type),
        value: reading.value,
        unit: reading.unit.clone(),
        normal_range: range.describe(),
        deviation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: f64, max: f64, low: Option<f64>, high: Option<f64>) -> ResolvedRange {
        ResolvedRange {
            key: "x".into(),
            normal_min: min,
            normal_max: max,
            critical_low: low,
            critical_high: high,
            unit: "mg/dL".into(),
            band: None,
        }
    }

    #[test]
    fn severity_formula_uses_critical_threshold() {
        // Halfway between max 100 and critical 400.
        let r = range(70.0, 100.0, Some(50.0), Some(400.0));
        assert_eq!(deviation_severity(250.0, &r), 50);
        assert_eq!(deviation_severity(400.0, &r), 100);
        assert_eq!(deviation_severity(900.0, &r), 100);
        // Low side: 60 is halfway between min 70 and critical 50.
        assert_eq!(deviation_severity(60.0, &r), 50);
    }

    #[test]
    fn severity_formula_uses_proxy_without_critical() {
        // Proxy critical high = 200, so 150 is halfway.
        let r = range(0.0, 100.0, None, None);
        assert_eq!(deviation_severity(150.0, &r), 50);

        // Proxy critical low = 35 for min 70.
        let r = range(70.0, 100.0, None, None);
        assert_eq!(deviation_severity(52.5, &r), 50);
    }

    #[test]
    fn proxy_lies_outside_range_that_straddles_zero() {
        let r = range(-2.0, 2.0, None, None);
        assert_eq!(proxy_critical(&r, RangeVerdict::Low), -6.0);
        assert_eq!(proxy_critical(&r, RangeVerdict::High), 6.0);

        // Equidistant readings score the same, one unit out is a quarter.
        assert_eq!(deviation_severity(-3.0, &r), 25);
        assert_eq!(deviation_severity(3.0, &r), 25);
        assert_eq!(deviation_severity(-6.0, &r), 100);
    }

    #[test]
    fn proxy_for_negative_range() {
        let r = range(-10.0, -5.0, None, None);
        assert_eq!(proxy_critical(&r, RangeVerdict::Low), -15.0);
        assert_eq!(proxy_critical(&r, RangeVerdict::High), 0.0);
        assert_eq!(deviation_severity(-12.5, &r), 50);
        assert_eq!(deviation_severity(-2.5, &r), 50);
    }

    #[test]
    fn severity_is_fifty_when_boundary_equals_critical() {
        let r = range(90.0, 120.0, Some(90.0), Some(180.0));
        assert_eq!(deviation_severity(85.0, &r), 50);
        assert_eq!(range_severity(5.0, 0.0, 0.0), 50);
    }

    #[test]
    fn severity_zero_within_range() {
        let r = range(70.0, 100.0, None, Some(400.0));
        assert_eq!(deviation_severity(100.0, &r), 0);
        assert_eq!(deviation_severity(70.0, &r), 0);
    }

    #[test]
    fn severity_is_monotonic_in_distance() {
        let r = range(70.0, 100.0, Some(50.0), Some(400.0));
        let mut last = 0;
        for step in 0..600 {
            let value = 100.0 + step as f64;
            let s = deviation_severity(value, &r);
            assert!(s >= last, "severity dropped at {value}");
            last = s;
        }
    }

    #[test]
    fn risk_category_boundaries() {
        assert_eq!(risk_category(0), RiskCategory::Minimal);
        assert_eq!(risk_category(20), RiskCategory::Minimal);
        assert_eq!(risk_category(21), RiskCategory::Low);
        assert_eq!(risk_category(40), RiskCategory::Low);
        assert_eq!(risk_category(41), RiskCategory::Moderate);
        assert_eq!(risk_category(60), RiskCategory::Moderate);
        assert_eq!(risk_category(61), RiskCategory::High);
        assert_eq!(risk_category(80), RiskCategory::High);
        assert_eq!(risk_category(81), RiskCategory::Critical);
        assert_eq!(risk_category(100), RiskCategory::Critical);
    }

    #[test]
    fn urgency_follows_category() {
        assert_eq!(urgency_for_severity(95), Urgency::Immediate);
        assert_eq!(urgency_for_severity(70), Urgency::Urgent);
        assert_eq!(urgency_for_severity(50), Urgency::Soon);
        assert_eq!(urgency_for_severity(30), Urgency::Routine);
        assert_eq!(urgency_for_severity(5), Urgency::Monitoring);
    }

    #[test]
    fn to_score_clamps_and_truncates() {
        assert_eq!(to_score(33.33), 33);
        assert_eq!(to_score(99.99), 99);
        assert_eq!(to_score(-4.0), 0);
        assert_eq!(to_score(250.0), 100);
        assert_eq!(to_score(f64::NAN), 0);
    }

    #[test]
    fn deviation_text() {
        assert_eq!(format_deviation(425.0, 100.0), "+325%");
        assert_eq!(format_deviation(35.0, 70.0), "-50%");
        assert_eq!(format_deviation(2.0, 0.0), "+2");
    }

    #[test]
    fn biomarker_display_names() {
        assert_eq!(display_biomarker("glucose_fasting"), "Glucose Fasting");
        assert_eq!(display_biomarker("hba1c"), "Hba1c");
    }

    #[test]
    fn keyword_containment_ignores_case() {
        assert!(contains_keyword("Type 2 Diabetes Mellitus", "diabetes"));
        assert!(!contains_keyword("Hypertension", "diabetes"));
    }
}
