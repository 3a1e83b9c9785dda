use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::BiologicalSex;
use super::{normalize_biomarker_type, BiomarkerReading, MedicationRecord};

/// Immutable per-call snapshot of one patient's structured health facts.
///
/// Historical series are keyed by normalized biomarker type and kept sorted by
/// `observed_at` (stable for equal timestamps), regardless of input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPatientContext")]
pub struct PatientContext {
    pub patient_id: Uuid,
    pub age: u32,
    pub biological_sex: BiologicalSex,
    pub active_diagnoses: BTreeSet<String>,
    pub active_medications: Vec<MedicationRecord>,
    pub current_observations: Vec<BiomarkerReading>,
    /// Sorted by `observed_at`; only `with_history` inserts. Read through `history_for`.
    historical_observations: BTreeMap<String, Vec<BiomarkerReading>>,
}

#[derive(Deserialize)]
struct RawPatientContext {
    patient_id: Uuid,
    age: u32,
    #[serde(default)]
    biological_sex: BiologicalSex,
    #[serde(default)]
    active_diagnoses: Vec<String>,
    #[serde(default)]
    active_medications: Vec<MedicationRecord>,
    #[serde(default)]
    current_observations: Vec<BiomarkerReading>,
    #[serde(default)]
    historical_observations: BTreeMap<String, Vec<BiomarkerReading>>,
}

impl From<RawPatientContext> for PatientContext {
    fn from(raw: RawPatientContext) -> Self {
        let mut ctx = PatientContext::new(raw.patient_id, raw.age, raw.biological_sex);
        for diagnosis in raw.active_diagnoses {
            ctx = ctx.with_diagnosis(diagnosis);
        }
        ctx.active_medications = raw.active_medications;
        ctx.current_observations = raw.current_observations;
        for (_, series) in raw.historical_observations {
            for reading in series {
                ctx = ctx.with_history(reading);
            }
        }
        ctx
    }
}

impl PatientContext {
    pub fn new(patient_id: Uuid, age: u32, biological_sex: BiologicalSex) -> Self {
        Self {
            patient_id,
            age,
            biological_sex,
            active_diagnoses: BTreeSet::new(),
            active_medications: Vec::new(),
            current_observations: Vec::new(),
            historical_observations: BTreeMap::new(),
        }
    }

    pub fn with_diagnosis(mut self, diagnosis: impl Into<String>) -> Self {
        let diagnosis = diagnosis.into().trim().to_string();
        if !diagnosis.is_empty() {
            self.active_diagnoses.insert(diagnosis);
        }
        self
    }

    pub fn with_medication(mut self, medication: MedicationRecord) -> Self {
        self.active_medications.push(medication);
        self
    }

    pub fn with_observation(mut self, reading: BiomarkerReading) -> Self {
        self.current_observations.push(reading);
        self
    }

    /// Add a historical reading, keeping its series ordered by time.
    pub fn with_history(mut self, reading: BiomarkerReading) -> Self {
        let series = self
            .historical_observations
            .entry(reading.biomarker_type.clone())
            .or_default();
        let pos = series.partition_point(|r| r.observed_at <= reading.observed_at);
        series.insert(pos, reading);
        self
    }

    /// Historical series for a biomarker type, oldest first.
    pub fn history_for(&self, biomarker_type: &str) -> &[BiomarkerReading] {
        self.historical_observations
            .get(&normalize_biomarker_type(biomarker_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.active_diagnoses.is_empty()
            && self.active_medications.is_empty()
            && self.current_observations.is_empty()
            && self.historical_observations.is_empty()
    }
}
