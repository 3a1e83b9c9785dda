use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        $(#[$meta])*
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(#[derive(Default)] BiologicalSex {
    Male => "male",
    Female => "female",
    Other => "other",
    #[default]
    Unknown => "unknown",
});

// Declaration order is the clinical ordering: Immediate sorts first.
str_enum!(Urgency {
    Immediate => "immediate",
    Urgent => "urgent",
    Soon => "soon",
    Routine => "routine",
    Monitoring => "monitoring",
});

impl Urgency {
    /// Human-readable follow-up window shown in priority actions.
    pub fn timeline(&self) -> &'static str {
        match self {
            Self::Immediate => "Immediate (within 1 hour)",
            Self::Urgent => "Urgent (within 24 hours)",
            Self::Soon => "Soon (within 1 week)",
            Self::Routine => "Routine (within 1 month)",
            Self::Monitoring => "Monitoring (regular follow-up)",
        }
    }
}

str_enum!(RiskCategory {
    Minimal => "minimal",
    Low => "low",
    Moderate => "moderate",
    High => "high",
    Critical => "critical",
});

str_enum!(FindingKind {
    RangeDeviation => "range_deviation",
    CriticalValue => "critical_value",
    AgeAdjustedDeviation => "age_adjusted_deviation",
    MedicationContext => "medication_context",
    TrendDeviation => "trend_deviation",
    ComorbidityPattern => "comorbidity_pattern",
    DrugInteraction => "drug_interaction",
});

str_enum!(TrendDirection {
    Increasing => "increasing",
    Decreasing => "decreasing",
});

str_enum!(RangeVerdict {
    Low => "low",
    Normal => "normal",
    High => "high",
});

impl RangeVerdict {
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

str_enum!(UnscoredReason {
    UnknownBiomarkerType => "unknown_biomarker_type",
    UnknownMedication => "unknown_medication",
});
