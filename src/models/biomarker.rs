use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{normalize_biomarker_type, ModelError};

/// One measured biomarker value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBiomarkerReading")]
pub struct BiomarkerReading {
    #[serde(rename = "type")]
    pub biomarker_type: String,
    pub value: f64,
    pub unit: String,
    pub observed_at: NaiveDateTime,
}

#[derive(Deserialize)]
struct RawBiomarkerReading {
    #[serde(rename = "type")]
    biomarker_type: String,
    value: f64,
    #[serde(default)]
    unit: String,
    observed_at: NaiveDateTime,
}

impl TryFrom<RawBiomarkerReading> for BiomarkerReading {
    type Error = ModelError;

    fn try_from(raw: RawBiomarkerReading) -> Result<Self, Self::Error> {
        Self::new(raw.biomarker_type, raw.value, raw.unit, raw.observed_at)
    }
}

impl BiomarkerReading {
    pub fn new(
        biomarker_type: impl AsRef<str>,
        value: f64,
        unit: impl Into<String>,
        observed_at: NaiveDateTime,
    ) -> Result<Self, ModelError> {
        let biomarker_type = normalize_biomarker_type(biomarker_type.as_ref());
        if biomarker_type.is_empty() {
            return Err(ModelError::EmptyBiomarkerType);
        }
        if !value.is_finite() {
            return Err(ModelError::NonFiniteValue(biomarker_type));
        }

        Ok(Self {
            biomarker_type,
            value,
            unit: unit.into().trim().to_string(),
            observed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn new_normalizes_type() {
        let r = BiomarkerReading::new("Glucose Fasting", 92.0, " mg/dL ", at()).unwrap();
        assert_eq!(r.biomarker_type, "glucose_fasting");
        assert_eq!(r.unit, "mg/dL");
    }

    #[test]
    fn rejects_non_finite_value() {
        assert_eq!(
            BiomarkerReading::new("glucose", f64::NAN, "mg/dL", at()),
            Err(ModelError::NonFiniteValue("glucose".into()))
        );
        assert!(BiomarkerReading::new("glucose", f64::INFINITY, "mg/dL", at()).is_err());
    }

    #[test]
    fn rejects_empty_type() {
        assert_eq!(
            BiomarkerReading::new("  ", 1.0, "", at()),
            Err(ModelError::EmptyBiomarkerType)
        );
    }

    #[test]
    fn deserialize_goes_through_validation() {
        let json = r#"{"type":"Creatinine","value":1.4,"unit":"mg/dL","observed_at":"2026-03-01T08:00:00"}"#;
        let r: BiomarkerReading = serde_json::from_str(json).unwrap();
        assert_eq!(r.biomarker_type, "creatinine");

        let bad = r#"{"type":"","value":1.4,"unit":"mg/dL","observed_at":"2026-03-01T08:00:00"}"#;
        assert!(serde_json::from_str::<BiomarkerReading>(bad).is_err());
    }
}
