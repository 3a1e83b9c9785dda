use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};

use crate::anomaly::{AnomalyEngine, AnomalyEvaluator, AnomalyReport, EmergencyProtocol};
use crate::config;
use crate::models::PatientContext;

// ── CLI ─────────────────────────────────────────────────────────────

/// Multi-layer clinical anomaly engine.
#[derive(Parser, Debug)]
#[command(name = "vigilant", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate one patient file and print the anomaly report as JSON.
    Evaluate {
        /// Path to a patient context JSON file.
        #[arg(long)]
        patient: PathBuf,

        /// Directory holding the reference tables.
        #[arg(long, env = "VIGILANT_REFERENCE_DIR")]
        reference_dir: Option<PathBuf>,

        /// Report timestamp (e.g. 2026-03-01T12:00:00). Defaults to now.
        #[arg(long)]
        at: Option<NaiveDateTime>,

        /// Pretty-print the report.
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a reference table directory and print table sizes.
    CheckReference {
        /// Directory holding the reference tables.
        #[arg(long, env = "VIGILANT_REFERENCE_DIR")]
        reference_dir: Option<PathBuf>,
    },
}

// ── commands ────────────────────────────────────────────────────────

pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Command::Evaluate {
            patient,
            reference_dir,
            at,
            pretty,
        } => {
            let report = evaluate_file(&patient, reference_dir, at)?;
            let json = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            writeln!(out, "{json}")?;
        }
        Command::CheckReference { reference_dir } => {
            check_reference(reference_dir, &mut out)?;
        }
    }
    Ok(())
}

/// Load a patient file and evaluate it against the configured tables.
pub fn evaluate_file(
    patient: &Path,
    reference_dir: Option<PathBuf>,
    at: Option<NaiveDateTime>,
) -> anyhow::Result<AnomalyReport> {
    let raw = std::fs::read_to_string(patient)
        .with_context(|| format!("reading patient file {}", patient.display()))?;
    let context: PatientContext = serde_json::from_str(&raw)
        .with_context(|| format!("parsing patient file {}", patient.display()))?;

    let source = config::reference_source(reference_dir);
    let engine = AnomalyEngine::from_source(source.as_ref())
        .with_context(|| format!("loading reference tables from {}", source.describe()))?;

    let report = match at {
        Some(at) => engine.evaluate_at(&context, at)?,
        None => engine.evaluate(&context)?,
    };

    if report.has_critical_alert {
        let actions = EmergencyProtocol::process(&report);
        tracing::warn!(
            patient_id = %report.patient_id,
            emergency_actions = actions.len(),
            "Critical alert raised"
        );
    }

    Ok(report)
}

fn check_reference(reference_dir: Option<PathBuf>, out: &mut impl Write) -> anyhow::Result<()> {
    let source = config::reference_source(reference_dir);
    let tables = source
        .load()
        .with_context(|| format!("validating reference tables from {}", source.describe()))?;

    writeln!(out, "source:        {}", source.describe())?;
    writeln!(out, "biomarkers:    {}", tables.biomarker_count())?;
    writeln!(out, "interactions:  {}", tables.interaction_rules().len())?;
    writeln!(out, "patterns:      {}", tables.comorbidity_patterns().len())?;
    writeln!(out, "formulary:     {}", tables.formulary_size())?;
    Ok(())
}
