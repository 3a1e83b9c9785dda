use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;

use crate::models::PatientContext;

use super::aggregate::aggregate;
use super::detection::{
    detect_age_adjusted, detect_comorbidities, detect_critical_values, detect_interactions,
    detect_medication_context, detect_range_deviations, EvaluationSnapshot,
};
use super::emergency::{EmergencyAction, EmergencyProtocol};
use super::reference::ReferenceTables;
use super::store::{ReferenceSource, ReferenceStore};
use super::trend::detect_trends;
use super::types::{AnomalyEvaluator, AnomalyReport, EngineError};

/// Default implementation of the anomaly evaluator.
/// Runs all seven layers against one reference snapshot and aggregates the result.
pub struct AnomalyEngine {
    store: ReferenceStore,
}

impl AnomalyEngine {
    pub fn new(tables: ReferenceTables) -> Self {
        Self {
            store: ReferenceStore::new(tables),
        }
    }

    /// Build from a source. A malformed table set is a configuration error
    /// and no engine is created.
    pub fn from_source(source: &dyn ReferenceSource) -> Result<Self, EngineError> {
        let tables = source.load()?;
        tracing::info!(
            source = %source.describe(),
            biomarkers = tables.biomarker_count(),
            interactions = tables.interaction_rules().len(),
            patterns = tables.comorbidity_patterns().len(),
            "Reference tables loaded"
        );
        Ok(Self::new(tables))
    }

    /// The reference tables currently in effect.
    pub fn reference(&self) -> Result<Arc<ReferenceTables>, EngineError> {
        self.store.snapshot()
    }

    /// Replace the reference tables. On failure the current tables stay active.
    pub fn reload(&self, source: &dyn ReferenceSource) -> Result<(), EngineError> {
        self.store.reload(source)
    }

    /// Evaluate many patients against one reference snapshot. Reports come
    /// back in input order.
    pub fn evaluate_batch_at(
        &self,
        contexts: &[PatientContext],
        generated_at: NaiveDateTime,
    ) -> Result<Vec<AnomalyReport>, EngineError> {
        let tables = self.store.snapshot()?;
        if contexts.is_empty() {
            return Ok(Vec::new());
        }

        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(contexts.len());
        let chunk_size = contexts.len().div_ceil(workers);

        let start = Instant::now();
        let reports = std::thread::scope(|scope| {
            let handles: Vec<_> = contexts
                .chunks(chunk_size)
                .map(|chunk| {
                    let tables = &tables;
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|ctx| evaluate_with(tables, ctx, generated_at))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect::<Vec<_>>()
        });

        tracing::info!(
            patients = reports.len(),
            workers,
            processing_ms = start.elapsed().as_millis() as u64,
            "Batch evaluation complete"
        );

        Ok(reports)
    }

    pub fn evaluate_batch(&self, contexts: &[PatientContext]) -> Result<Vec<AnomalyReport>, EngineError> {
        self.evaluate_batch_at(contexts, chrono::Local::now().naive_local())
    }

    /// Get emergency actions for the critical findings of a report.
    pub fn emergency_actions(report: &AnomalyReport) -> Vec<EmergencyAction> {
        EmergencyProtocol::process(report)
    }
}

impl AnomalyEvaluator for AnomalyEngine {
    fn evaluate_at(
        &self,
        context: &PatientContext,
        generated_at: NaiveDateTime,
    ) -> Result<AnomalyReport, EngineError> {
        let tables = self.store.snapshot()?;
        Ok(evaluate_with(&tables, context, generated_at))
    }
}

/// Run every layer and aggregate. Infallible once a snapshot is held:
/// per-item problems end up in `unscored`.
fn evaluate_with(
    tables: &ReferenceTables,
    context: &PatientContext,
    generated_at: NaiveDateTime,
) -> AnomalyReport {
    let start = Instant::now();
    let snapshot = EvaluationSnapshot::build(context, tables, generated_at.date());

    let ranges = detect_range_deviations(&snapshot);
    let criticals = detect_critical_values(&snapshot);
    let age_adjusted = detect_age_adjusted(&snapshot);

    let mut findings: Vec<_> = ranges
        .into_iter()
        .chain(criticals)
        .chain(age_adjusted)
        .collect();

    let medication = detect_medication_context(&snapshot, &findings);
    let trends = detect_trends(&snapshot);
    let comorbidities = detect_comorbidities(&snapshot);
    let interactions = detect_interactions(&snapshot);

    tracing::debug!(
        patient_id = %context.patient_id,
        reading_layers = findings.len(),
        medication = medication.len(),
        trends = trends.len(),
        comorbidities = comorbidities.len(),
        interactions = interactions.len(),
        "Layer evaluation done"
    );

    findings.extend(medication);
    findings.extend(trends);
    findings.extend(comorbidities);
    findings.extend(interactions);

    let EvaluationSnapshot { unscored, .. } = snapshot;
    let report = aggregate(context.patient_id, generated_at, findings, unscored);

    tracing::info!(
        patient_id = %report.patient_id,
        findings = report.findings.len(),
        unscored = report.unscored.len(),
        overall_severity = report.overall_severity,
        processing_ms = start.elapsed().as_millis() as u64,
        "Anomaly evaluation complete"
    );

    report
}
