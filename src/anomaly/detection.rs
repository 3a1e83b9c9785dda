use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::enums::{FindingKind, RangeVerdict, UnscoredReason, Urgency};
use crate::models::{BiomarkerReading, MedicationRecord, PatientContext};

use super::helpers::{
    affected_biomarker, contains_keyword, deviation_severity, display_biomarker, to_score,
    urgency_for_severity,
};
use super::messages::MessageTemplates;
use super::reference::{ReferenceTables, ResolvedRange};
use super::types::*;

/// Layer 4 severity relative to the finding it annotates.
const MEDICATION_CONTEXT_FACTOR: f64 = 0.9;

/// Layer 2 severity for any critical breach.
const CRITICAL_VALUE_SEVERITY: u8 = 100;

// ---------------------------------------------------------------------------
// EvaluationSnapshot: reference-resolved view of one PatientContext
// ---------------------------------------------------------------------------

/// A current reading with its general and age-adjusted ranges resolved.
pub struct ScoredReading<'a> {
    pub reading: &'a BiomarkerReading,
    pub generic: ResolvedRange,
    pub adjusted: ResolvedRange,
}

/// An active medication with its canonical (formulary) name.
pub struct ActiveMedication<'a> {
    pub record: &'a MedicationRecord,
    pub canonical: String,
}

/// Pre-resolved inputs for the layer evaluators. Items that reference data
/// cannot score are moved to `unscored` here, once, so layers never see them.
pub struct EvaluationSnapshot<'a> {
    pub context: &'a PatientContext,
    pub reference: &'a ReferenceTables,
    pub readings: Vec<ScoredReading<'a>>,
    pub medications: Vec<ActiveMedication<'a>>,
    pub unscored: Vec<UnscoredItem>,
}

impl<'a> EvaluationSnapshot<'a> {
    pub fn build(
        context: &'a PatientContext,
        reference: &'a ReferenceTables,
        as_of: NaiveDate,
    ) -> Self {
        let mut unscored: Vec<UnscoredItem> = Vec::new();
        let mut readings = Vec::with_capacity(context.current_observations.len());

        for reading in &context.current_observations {
            let resolved = reference
                .generic_range(&reading.biomarker_type, context.biological_sex)
                .and_then(|generic| {
                    reference
                        .get_range_for(&reading.biomarker_type, context.age, context.biological_sex)
                        .map(|adjusted| (generic, adjusted))
                });

            match resolved {
                Ok((generic, adjusted)) => readings.push(ScoredReading {
                    reading,
                    generic,
                    adjusted,
                }),
                Err(e) => {
                    tracing::debug!(
                        biomarker = %reading.biomarker_type,
                        "No reference range, reading left unscored"
                    );
                    if !unscored.iter().any(|u| u.item == reading.biomarker_type) {
                        unscored.push(UnscoredItem {
                            item: reading.biomarker_type.clone(),
                            reason: UnscoredReason::UnknownBiomarkerType,
                            detail: e.to_string(),
                        });
                    }
                }
            }
        }

        let mut medications = Vec::with_capacity(context.active_medications.len());
        for record in &context.active_medications {
            if !record.is_active_on(as_of) {
                tracing::debug!(
                    medication = %record.canonical_name,
                    "Medication not active on report date, skipped"
                );
                continue;
            }
            match reference.resolve_medication(&record.canonical_name) {
                Some(canonical) => medications.push(ActiveMedication { record, canonical }),
                None => {
                    tracing::debug!(
                        medication = %record.canonical_name,
                        "Medication not in formulary, left unscored"
                    );
                    unscored.push(UnscoredItem {
                        item: record.canonical_name.clone(),
                        reason: UnscoredReason::UnknownMedication,
                        detail: format!("Unknown medication: {}", record.canonical_name),
                    });
                }
            }
        }

        Self {
            context,
            reference,
            readings,
            medications,
            unscored,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn reading_finding(
    layer: u8,
    kind: FindingKind,
    severity: u8,
    is_critical: bool,
    urgency: Urgency,
    title: String,
    message: String,
    recommendation: String,
    scored: &ScoredReading,
    range: &ResolvedRange,
    verdict: RangeVerdict,
) -> Finding {
    let reading = scored.reading;
    Finding {
        id: String::new(),
        origin_layer: layer,
        kind,
        severity,
        is_critical,
        title,
        message,
        recommendation,
        urgency,
        affected_biomarker: Some(affected_biomarker(reading, range, verdict)),
        evidence: Evidence::Reading {
            biomarker_type: reading.biomarker_type.clone(),
            value: reading.value,
            unit: reading.unit.clone(),
            observed_at: reading.observed_at,
            verdict,
        },
    }
}

// ---------------------------------------------------------------------------
// [1] RANGE CHECK
// ---------------------------------------------------------------------------

/// Flag readings outside the general normal range. At most one finding per reading.
pub fn detect_range_deviations(snapshot: &EvaluationSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();

    for scored in &snapshot.readings {
        let reading = scored.reading;
        let verdict = scored.generic.verdict(reading.value);
        if !verdict.is_abnormal() {
            continue;
        }

        let high = verdict == RangeVerdict::High;
        let name = display_biomarker(&reading.biomarker_type);
        let severity = deviation_severity(reading.value, &scored.generic);

        findings.push(reading_finding(
            LAYER_RANGE_CHECK,
            FindingKind::RangeDeviation,
            severity,
            false,
            urgency_for_severity(severity),
            MessageTemplates::range_title(&name, high),
            MessageTemplates::range_description(
                &name,
                reading.value,
                &reading.unit,
                &scored.generic.describe(),
                high,
            ),
            MessageTemplates::range_recommendation(&name),
            scored,
            &scored.generic,
            verdict,
        ));
    }

    findings
}

// ---------------------------------------------------------------------------
// [2] CRITICAL VALUE
// ---------------------------------------------------------------------------

/// Flag breaches of critical thresholds. Runs independently of Layer 1, so a
/// reading may carry both findings.
pub fn detect_critical_values(snapshot: &EvaluationSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();

    for scored in &snapshot.readings {
        let reading = scored.reading;
        let range = &scored.adjusted;

        let breach = match (range.critical_low, range.critical_high) {
            (Some(low), _) if reading.value < low => Some((RangeVerdict::Low, low)),
            (_, Some(high)) if reading.value > high => Some((RangeVerdict::High, high)),
            _ => None,
        };
        let Some((verdict, threshold)) = breach else {
            continue;
        };

        let high = verdict == RangeVerdict::High;
        let name = display_biomarker(&reading.biomarker_type);

        tracing::debug!(
            biomarker = %reading.biomarker_type,
            threshold,
            "Critical value detected"
        );

        findings.push(reading_finding(
            LAYER_CRITICAL_VALUE,
            FindingKind::CriticalValue,
            CRITICAL_VALUE_SEVERITY,
            true,
            Urgency::Immediate,
            MessageTemplates::critical_title(&name, high),
            MessageTemplates::critical_description(&name, reading.value, &reading.unit, threshold, high),
            MessageTemplates::critical_recommendation(),
            scored,
            range,
            verdict,
        ));
    }

    findings
}

// ---------------------------------------------------------------------------
// [3] AGE-ADJUSTED REFERENCE
// ---------------------------------------------------------------------------

/// Re-test readings against their age band; report only where the band's
/// verdict differs from the general range's verdict.
pub fn detect_age_adjusted(snapshot: &EvaluationSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();

    for scored in &snapshot.readings {
        let Some(band) = scored.adjusted.band.as_deref() else {
            continue;
        };
        let reading = scored.reading;
        let generic_verdict = scored.generic.verdict(reading.value);
        let band_verdict = scored.adjusted.verdict(reading.value);
        if generic_verdict == band_verdict {
            continue;
        }

        let name = display_biomarker(&reading.biomarker_type);
        let band_range = scored.adjusted.describe();
        let within = !band_verdict.is_abnormal();

        let (severity, message) = if within {
            (
                0,
                MessageTemplates::age_adjusted_within(
                    &name,
                    reading.value,
                    &reading.unit,
                    band,
                    &band_range,
                ),
            )
        } else {
            (
                deviation_severity(reading.value, &scored.adjusted),
                MessageTemplates::age_adjusted_abnormal(
                    &name,
                    reading.value,
                    &reading.unit,
                    band,
                    &band_range,
                    band_verdict == RangeVerdict::High,
                ),
            )
        };

        findings.push(reading_finding(
            LAYER_AGE_ADJUSTED,
            FindingKind::AgeAdjustedDeviation,
            severity,
            false,
            urgency_for_severity(severity),
            MessageTemplates::age_adjusted_title(&name, within),
            message,
            MessageTemplates::age_adjusted_recommendation(&name, within),
            scored,
            &scored.adjusted,
            band_verdict,
        ));
    }

    findings
}

// ---------------------------------------------------------------------------
// [4] MEDICATION CONTEXT
// ---------------------------------------------------------------------------

/// Annotate readings that stay abnormal while an active medication targets
/// their axis. `prior` holds the Layer 1-3 findings; each abnormal reading is
/// annotated once, from its most severe prior finding.
pub fn detect_medication_context(snapshot: &EvaluationSnapshot, prior: &[Finding]) -> Vec<Finding> {
    // source key -> index into `strongest`, preserving first-seen order
    let mut index: BTreeMap<String, usize> = BTreeMap::new();
    let mut strongest: Vec<&Finding> = Vec::new();

    for finding in prior {
        let Evidence::Reading { verdict, .. } = &finding.evidence else {
            continue;
        };
        if !verdict.is_abnormal() {
            continue;
        }
        let key = finding.source_key();
        match index.get(&key) {
            Some(&i) if strongest[i].severity < finding.severity => strongest[i] = finding,
            Some(_) => {}
            None => {
                index.insert(key, strongest.len());
                strongest.push(finding);
            }
        }
    }

    let mut findings = Vec::new();

    for underlying in strongest {
        let Evidence::Reading {
            biomarker_type,
            value,
            observed_at,
            ..
        } = &underlying.evidence
        else {
            continue;
        };

        let keywords = snapshot.reference.medications_targeting(biomarker_type);
        if keywords.is_empty() {
            continue;
        }

        let mut treating: Vec<String> = Vec::new();
        for med in &snapshot.medications {
            let targets = keywords.iter().any(|k| contains_keyword(&med.canonical, k));
            if targets && !treating.contains(&med.record.canonical_name) {
                treating.push(med.record.canonical_name.clone());
            }
        }
        if treating.is_empty() {
            continue;
        }

        let name = display_biomarker(biomarker_type);
        let severity = to_score(MEDICATION_CONTEXT_FACTOR * f64::from(underlying.severity));

        findings.push(Finding {
            id: String::new(),
            origin_layer: LAYER_MEDICATION_CONTEXT,
            kind: FindingKind::MedicationContext,
            severity,
            is_critical: false,
            title: MessageTemplates::medication_context_title(&name),
            message: MessageTemplates::medication_context(&name, &treating),
            recommendation: MessageTemplates::medication_context_recommendation(),
            urgency: urgency_for_severity(severity),
            affected_biomarker: underlying.affected_biomarker.clone(),
            evidence: Evidence::MedicationContext {
                biomarker_type: biomarker_type.clone(),
                value: *value,
                observed_at: *observed_at,
                medications: treating,
                underlying_layer: underlying.origin_layer,
                underlying_severity: underlying.severity,
            },
        });
    }

    findings
}

// ---------------------------------------------------------------------------
// [6] COMORBIDITY PATTERNS
// ---------------------------------------------------------------------------

/// One finding per pattern whose every required category is present among the
/// active diagnoses (and whose biomarker conditions, if any, all hold).
pub fn detect_comorbidities(snapshot: &EvaluationSnapshot) -> Vec<Finding> {
    let diagnoses = &snapshot.context.active_diagnoses;
    let mut findings = Vec::new();

    'patterns: for pattern in snapshot.reference.comorbidity_patterns() {
        let mut matched: Vec<String> = Vec::new();
        for category in &pattern.required_categories {
            let hits: Vec<&String> = diagnoses
                .iter()
                .filter(|d| contains_keyword(d, category))
                .collect();
            if hits.is_empty() {
                continue 'patterns;
            }
            for hit in hits {
                if !matched.contains(hit) {
                    matched.push(hit.clone());
                }
            }
        }

        for condition in &pattern.biomarker_conditions {
            let holds = snapshot
                .context
                .current_observations
                .iter()
                .any(|r| r.biomarker_type == condition.biomarker && condition.holds(r.value));
            if !holds {
                continue 'patterns;
            }
        }

        let name = pattern.display_name();
        findings.push(Finding {
            id: String::new(),
            origin_layer: LAYER_COMORBIDITY,
            kind: FindingKind::ComorbidityPattern,
            severity: pattern.severity,
            is_critical: false,
            title: name.clone(),
            message: MessageTemplates::comorbidity(&pattern.message, &matched),
            recommendation: pattern
                .recommendation
                .clone()
                .unwrap_or_else(MessageTemplates::comorbidity_recommendation),
            urgency: urgency_for_severity(pattern.severity),
            affected_biomarker: None,
            evidence: Evidence::Diagnoses {
                pattern: name,
                diagnoses: matched,
            },
        });
    }

    findings
}

// ---------------------------------------------------------------------------
// [7] DRUG INTERACTIONS
// ---------------------------------------------------------------------------

/// Check every unordered pair of distinct canonical medications against the
/// interaction rules. Score, urgency and criticality come from the tier table.
pub fn detect_interactions(snapshot: &EvaluationSnapshot) -> Vec<Finding> {
    // (canonical, display) in first-seen order
    let mut unique: Vec<(&str, &str)> = Vec::new();
    for med in &snapshot.medications {
        if !unique.iter().any(|(c, _)| *c == med.canonical) {
            unique.push((med.canonical.as_str(), med.record.canonical_name.as_str()));
        }
    }

    let mut findings = Vec::new();

    for (i, (a, display_a)) in unique.iter().enumerate() {
        for (b, display_b) in &unique[i + 1..] {
            for rule in snapshot.reference.interactions_for(a, b) {
                let Some(tier) = snapshot.reference.tier(&rule.severity) else {
                    tracing::debug!(tier = %rule.severity, "Interaction tier missing, rule skipped");
                    continue;
                };

                findings.push(Finding {
                    id: String::new(),
                    origin_layer: LAYER_DRUG_INTERACTION,
                    kind: FindingKind::DrugInteraction,
                    severity: tier.score,
                    is_critical: tier.is_critical,
                    title: MessageTemplates::interaction_title(display_a, display_b),
                    message: MessageTemplates::interaction(
                        display_a,
                        display_b,
                        &rule.severity,
                        &rule.description,
                    ),
                    recommendation: rule
                        .recommendation
                        .clone()
                        .unwrap_or_else(MessageTemplates::interaction_recommendation),
                    urgency: tier.urgency,
                    affected_biomarker: None,
                    evidence: Evidence::DrugPair {
                        drug_a: a.to_string(),
                        drug_b: b.to_string(),
                        tier: rule.severity.clone(),
                    },
                });
            }
        }
    }

    findings
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{NaiveDate, NaiveDateTime};
    use uuid::Uuid;

    use super::*;
    use crate::anomaly::reference::{
        ComorbidityPattern, InteractionRule, ReferenceParts, ReferenceRange,
    };
    use crate::models::enums::BiologicalSex;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn at() -> NaiveDateTime {
        today().and_hms_opt(8, 0, 0).unwrap()
    }

    fn reading(kind: &str, value: f64, unit: &str) -> BiomarkerReading {
        BiomarkerReading::new(kind, value, unit, at()).unwrap()
    }

    fn med(name: &str) -> MedicationRecord {
        MedicationRecord::new(name, "", "oral", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), None)
            .unwrap()
    }

    fn context(age: u32) -> PatientContext {
        PatientContext::new(Uuid::new_v4(), age, BiologicalSex::Unknown)
    }

    fn builtin() -> ReferenceTables {
        ReferenceTables::builtin().unwrap()
    }

    #[test]
    fn snapshot_records_unknown_biomarker_once() {
        let tables = builtin();
        let ctx = context(40)
            .with_observation(reading("unobtainium", 1.0, "u"))
            .with_observation(reading("unobtainium", 2.0, "u"))
            .with_observation(reading("glucose_fasting", 90.0, "mg/dL"));
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());

        assert_eq!(snap.readings.len(), 1);
        assert_eq!(snap.unscored.len(), 1);
        assert_eq!(snap.unscored[0].reason, UnscoredReason::UnknownBiomarkerType);
    }

    #[test]
    fn snapshot_records_unknown_medication_and_skips_inactive() {
        let tables = builtin();
        let stopped = MedicationRecord::new(
            "Aspirin",
            "81mg",
            "oral",
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            Some(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
        )
        .unwrap();
        let ctx = context(40)
            .with_medication(med("Coumadin"))
            .with_medication(med("Snake Oil"))
            .with_medication(stopped);
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());

        assert_eq!(snap.medications.len(), 1);
        assert_eq!(snap.medications[0].canonical, "warfarin");
        assert_eq!(snap.unscored.len(), 1);
        assert_eq!(snap.unscored[0].reason, UnscoredReason::UnknownMedication);
        assert_eq!(snap.unscored[0].item, "Snake Oil");
    }

    #[test]
    fn range_check_boundary_is_exact() {
        let tables = builtin();
        let at_max = context(40).with_observation(reading("glucose_fasting", 100.0, "mg/dL"));
        let snap = EvaluationSnapshot::build(&at_max, &tables, today());
        assert!(detect_range_deviations(&snap).is_empty());

        let beyond = context(40).with_observation(reading("glucose_fasting", 101.0, "mg/dL"));
        let snap = EvaluationSnapshot::build(&beyond, &tables, today());
        let findings = detect_range_deviations(&snap);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::RangeDeviation);
        // 1 / (400 - 100) * 100 truncates to 0.
        assert_eq!(findings[0].severity, 0);
    }

    #[test]
    fn range_check_severity_and_detail() {
        let tables = builtin();
        let ctx = context(40).with_observation(reading("glucose_fasting", 250.0, "mg/dL"));
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());
        let findings = detect_range_deviations(&snap);

        assert_eq!(findings[0].severity, 50);
        assert_eq!(findings[0].urgency, Urgency::Soon);
        let detail = findings[0].affected_biomarker.as_ref().unwrap();
        assert_eq!(detail.normal_range, "70-100 mg/dL");
        assert_eq!(detail.deviation, "+150%");
    }

    #[test]
    fn critical_value_scenario() {
        let tables = builtin();
        let ctx = context(40).with_observation(reading("glucose_fasting", 425.0, "mg/dL"));
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());

        let critical = detect_critical_values(&snap);
        assert_eq!(critical.len(), 1);
        assert!(critical[0].is_critical);
        assert_eq!(critical[0].severity, 100);
        assert_eq!(critical[0].urgency, Urgency::Immediate);
        assert_eq!(critical[0].affected_biomarker.as_ref().unwrap().deviation, "+325%");

        // Layer 1 fires independently for the same reading.
        let range = detect_range_deviations(&snap);
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].severity, 100);
    }

    #[test]
    fn critical_threshold_is_strict() {
        let tables = builtin();
        let ctx = context(40).with_observation(reading("glucose_fasting", 400.0, "mg/dL"));
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());
        assert!(detect_critical_values(&snap).is_empty());
    }

    #[test]
    fn critical_low_detected() {
        let tables = builtin();
        let ctx = context(40).with_observation(reading("potassium", 2.1, "mEq/L"));
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());
        let critical = detect_critical_values(&snap);
        assert_eq!(critical.len(), 1);
        assert!(critical[0].title.contains("low"));
    }

    #[test]
    fn age_adjusted_only_reports_differing_verdict() {
        let tables = builtin();

        // Adult band equals the general range: no Layer 3 finding.
        let adult = context(40).with_observation(reading("glucose_fasting", 120.0, "mg/dL"));
        let snap = EvaluationSnapshot::build(&adult, &tables, today());
        assert!(detect_age_adjusted(&snap).is_empty());

        // Geriatric band accepts 120 while the general range flags it.
        let elderly = context(70).with_observation(reading("glucose_fasting", 120.0, "mg/dL"));
        let snap = EvaluationSnapshot::build(&elderly, &tables, today());
        let findings = detect_age_adjusted(&snap);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, 0);
        assert!(findings[0].message.contains("geriatric"));
        assert!(matches!(
            findings[0].evidence,
            Evidence::Reading { verdict: RangeVerdict::Normal, .. }
        ));

        // Both ranges flag 150: verdicts agree, nothing to add.
        let both = context(70).with_observation(reading("glucose_fasting", 150.0, "mg/dL"));
        let snap = EvaluationSnapshot::build(&both, &tables, today());
        assert!(detect_age_adjusted(&snap).is_empty());
    }

    #[test]
    fn age_adjusted_flags_value_general_range_accepts() {
        let mut r = ReferenceRange {
            normal_min: 0.0,
            normal_max: 100.0,
            unit: "u".into(),
            critical_low: None,
            critical_high: None,
            age_bands: vec![],
        };
        r.age_bands = vec![
            crate::anomaly::reference::AgeBand {
                label: Some("child".into()),
                min_age: 0,
                max_age: Some(18),
                normal_min: 0.0,
                normal_max: 50.0,
                critical_low: None,
                critical_high: None,
            },
            crate::anomaly::reference::AgeBand {
                label: None,
                min_age: 18,
                max_age: None,
                normal_min: 0.0,
                normal_max: 100.0,
                critical_low: None,
                critical_high: None,
            },
        ];
        let tables = ReferenceTables::from_parts(ReferenceParts {
            biomarker_ranges: BTreeMap::from([("marker".to_string(), r)]),
            ..Default::default()
        })
        .unwrap();

        let ctx = context(10).with_observation(reading("marker", 75.0, "u"));
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());
        assert!(detect_range_deviations(&snap).is_empty());

        let findings = detect_age_adjusted(&snap);
        assert_eq!(findings.len(), 1);
        // Proxy critical = 100, so 75 sits halfway between 50 and 100.
        assert_eq!(findings[0].severity, 50);
        assert!(findings[0].message.contains("child"));
    }

    #[test]
    fn medication_context_scales_underlying_severity() {
        let tables = builtin();
        let ctx = context(40)
            .with_observation(reading("glucose_fasting", 250.0, "mg/dL"))
            .with_medication(med("Glucophage"));
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());

        let mut prior = detect_range_deviations(&snap);
        prior.extend(detect_critical_values(&snap));
        let findings = detect_medication_context(&snap, &prior);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, 45);
        assert!(findings[0].message.contains("Glucophage"));
        assert!(!findings[0].is_critical);
    }

    #[test]
    fn medication_context_one_finding_per_reading() {
        let tables = builtin();
        let ctx = context(40)
            .with_observation(reading("glucose_fasting", 425.0, "mg/dL"))
            .with_medication(med("Metformin"))
            .with_medication(med("Lantus"));
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());

        let mut prior = detect_range_deviations(&snap);
        prior.extend(detect_critical_values(&snap));
        let findings = detect_medication_context(&snap, &prior);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, 90);
        match &findings[0].evidence {
            Evidence::MedicationContext {
                medications,
                underlying_layer,
                ..
            } => {
                assert_eq!(medications, &vec!["Metformin".to_string(), "Lantus".to_string()]);
                assert_eq!(*underlying_layer, LAYER_RANGE_CHECK);
            }
            other => panic!("unexpected evidence {other:?}"),
        }
    }

    #[test]
    fn medication_context_requires_targeting_medication() {
        let tables = builtin();
        let ctx = context(40)
            .with_observation(reading("glucose_fasting", 250.0, "mg/dL"))
            .with_medication(med("Aspirin"));
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());
        let prior = detect_range_deviations(&snap);
        assert!(detect_medication_context(&snap, &prior).is_empty());
    }

    #[test]
    fn comorbidity_fires_once_when_all_categories_present() {
        let tables = builtin();
        let ctx = context(60)
            .with_diagnosis("Type 2 Diabetes")
            .with_diagnosis("Hypertension")
            .with_diagnosis("Dyslipidemia");
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());
        let findings = detect_comorbidities(&snap);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::ComorbidityPattern);
        assert_eq!(findings[0].title, "Metabolic syndrome");
        assert!(findings[0].message.contains("Type 2 Diabetes"));
    }

    #[test]
    fn comorbidity_requires_every_category() {
        let tables = builtin();
        let ctx = context(60)
            .with_diagnosis("type 2 diabetes")
            .with_diagnosis("hypertension");
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());
        assert!(detect_comorbidities(&snap).is_empty());
    }

    #[test]
    fn comorbidity_biomarker_conditions_must_hold() {
        let tables = builtin();
        let base = context(60)
            .with_diagnosis("Diabetes mellitus")
            .with_diagnosis("Essential hypertension")
            .with_observation(reading("glucose_fasting", 210.0, "mg/dL"));

        let snap = EvaluationSnapshot::build(&base, &tables, today());
        assert!(detect_comorbidities(&snap).is_empty());

        let with_bp = base
            .clone()
            .with_observation(reading("blood_pressure_systolic", 150.0, "mmHg"));
        let snap = EvaluationSnapshot::build(&with_bp, &tables, today());
        let findings = detect_comorbidities(&snap);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, 80);
    }

    #[test]
    fn independent_patterns_fire_together() {
        let tables = ReferenceTables::from_parts(ReferenceParts {
            comorbidity_patterns: vec![
                ComorbidityPattern {
                    name: Some("A".into()),
                    required_categories: vec!["copd".into()],
                    biomarker_conditions: vec![],
                    severity: 40,
                    message: "a".into(),
                    recommendation: None,
                },
                ComorbidityPattern {
                    name: Some("B".into()),
                    required_categories: vec!["heart failure".into()],
                    biomarker_conditions: vec![],
                    severity: 50,
                    message: "b".into(),
                    recommendation: None,
                },
            ],
            ..Default::default()
        })
        .unwrap();
        let ctx = context(70)
            .with_diagnosis("COPD")
            .with_diagnosis("Congestive Heart Failure");
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());
        assert_eq!(detect_comorbidities(&snap).len(), 2);
    }

    #[test]
    fn interaction_scenario_uses_tier_table() {
        let tables = builtin();
        let ctx = context(70)
            .with_medication(med("Warfarin"))
            .with_medication(med("Aspirin"));
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());
        let findings = detect_interactions(&snap);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, 85);
        assert_eq!(findings[0].urgency, Urgency::Urgent);
        assert!(findings[0].is_critical);
    }

    #[test]
    fn interaction_match_is_order_independent() {
        let tables = builtin();
        let forward = context(70)
            .with_medication(med("Warfarin"))
            .with_medication(med("Aspirin"));
        let reverse = context(70)
            .with_medication(med("Aspirin"))
            .with_medication(med("Warfarin"));

        let a = detect_interactions(&EvaluationSnapshot::build(&forward, &tables, today()));
        let b = detect_interactions(&EvaluationSnapshot::build(&reverse, &tables, today()));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].severity, b[0].severity);
        assert_eq!(a[0].source_key(), b[0].source_key());
    }

    #[test]
    fn interaction_ignores_duplicate_and_brand_repeats() {
        let tables = builtin();
        let ctx = context(70)
            .with_medication(med("Warfarin"))
            .with_medication(med("Coumadin"))
            .with_medication(med("Aspirin"));
        let snap = EvaluationSnapshot::build(&ctx, &tables, today());
        assert_eq!(detect_interactions(&snap).len(), 1);
    }

    #[test]
    fn interaction_tier_mapping_is_table_driven() {
        let mut tiers = crate::anomaly::reference::default_interaction_tiers();
        if let Some(high) = tiers.get_mut("high") {
            high.score = 92;
            high.urgency = Urgency::Immediate;
        }
        let tables = ReferenceTables::from_parts(ReferenceParts {
            interaction_rules: vec![InteractionRule {
                drug1: "warfarin".into(),
                drug2: "aspirin".into(),
                severity: "high".into(),
                description: "bleeding".into(),
                recommendation: None,
            }],
            interaction_tiers: Some(tiers),
            ..Default::default()
        })
        .unwrap();
        let ctx = context(70)
            .with_medication(med("aspirin"))
            .with_medication(med("WARFARIN"));
        let findings = detect_interactions(&EvaluationSnapshot::build(&ctx, &tables, today()));

        assert_eq!(findings[0].severity, 92);
        assert_eq!(findings[0].urgency, Urgency::Immediate);
        assert_eq!(findings[0].recommendation, "Consult physician");
    }
}
