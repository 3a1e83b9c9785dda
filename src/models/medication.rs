use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMedicationRecord")]
pub struct MedicationRecord {
    pub canonical_name: String,
    pub strength: String,
    pub route: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct RawMedicationRecord {
    canonical_name: String,
    #[serde(default)]
    strength: String,
    #[serde(default = "default_route")]
    route: String,
    start_date: NaiveDate,
    #[serde(default)]
    end_date: Option<NaiveDate>,
}

fn default_route() -> String {
    "oral".to_string()
}

impl TryFrom<RawMedicationRecord> for MedicationRecord {
    type Error = ModelError;

    fn try_from(raw: RawMedicationRecord) -> Result<Self, Self::Error> {
        Self::new(
            raw.canonical_name,
            raw.strength,
            raw.route,
            raw.start_date,
            raw.end_date,
        )
    }
}

impl MedicationRecord {
    pub fn new(
        canonical_name: impl Into<String>,
        strength: impl Into<String>,
        route: impl Into<String>,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Result<Self, ModelError> {
        let canonical_name = canonical_name.into().trim().to_string();
        if canonical_name.is_empty() {
            return Err(ModelError::EmptyMedicationName);
        }
        if let Some(end) = end_date {
            if end < start_date {
                return Err(ModelError::EndBeforeStart {
                    name: canonical_name,
                    start: start_date,
                    end,
                });
            }
        }

        Ok(Self {
            canonical_name,
            strength: strength.into(),
            route: route.into(),
            start_date,
            end_date,
        })
    }

    /// Whether the medication is being taken on `date` (end date inclusive).
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.start_date <= date && self.end_date.map_or(true, |end| end >= date)
    }
}
