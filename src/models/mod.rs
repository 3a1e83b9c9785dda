//! Input value objects handed to the anomaly engine by the ingestion pipeline.
//!
//! Everything here is validated at construction (including deserialization),
//! so detection layers never re-check shape or finiteness at point of use.

pub mod biomarker;
pub mod enums;
pub mod medication;
pub mod patient;

use thiserror::Error;

pub use biomarker::BiomarkerReading;
pub use medication::MedicationRecord;
pub use patient::PatientContext;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid {field} value: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Biomarker type must not be empty")]
    EmptyBiomarkerType,

    #[error("Reading value for {0} is not a finite number")]
    NonFiniteValue(String),

    #[error("Medication name must not be empty")]
    EmptyMedicationName,

    #[error("Medication {name} ends ({end}) before it starts ({start})")]
    EndBeforeStart {
        name: String,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
}

/// Normalize a biomarker type into its reference-table key form.
pub fn normalize_biomarker_type(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn biomarker_type_normalization() {
        assert_eq!(normalize_biomarker_type(" Glucose Fasting "), "glucose_fasting");
        assert_eq!(normalize_biomarker_type("LDL-Cholesterol"), "ldl_cholesterol");
        assert_eq!(normalize_biomarker_type("hba1c"), "hba1c");
    }
}
