/// Message template builder for consistent clinician-facing wording.
/// Titles are short and scannable; descriptions carry the numbers.
pub struct MessageTemplates;

impl MessageTemplates {
    /// Layer 1 title.
    pub fn range_title(biomarker: &str, high: bool) -> String {
        if high {
            format!("Elevated {biomarker}")
        } else {
            format!("Low {biomarker}")
        }
    }

    pub fn range_description(
        biomarker: &str,
        value: f64,
        unit: &str,
        normal_range: &str,
        high: bool,
    ) -> String {
        let direction = if high { "above" } else { "below" };
        format!(
            "{biomarker} {value} {unit} is {direction} the normal range ({normal_range})",
        )
    }

    pub fn range_recommendation(biomarker: &str) -> String {
        format!("Review {biomarker} result and repeat measurement to confirm")
    }

    /// Layer 2 title.
    pub fn critical_title(biomarker: &str, high: bool) -> String {
        if high {
            format!("Critically high {biomarker}")
        } else {
            format!("Critically low {biomarker}")
        }
    }

    pub fn critical_description(biomarker: &str, value: f64, unit: &str, threshold: f64, high: bool) -> String {
        let direction = if high { "above" } else { "below" };
        format!(
            "CRITICAL: {biomarker} {value} {unit} is {direction} the critical threshold of {threshold} {unit}",
        )
    }

    pub fn critical_recommendation() -> String {
        "Immediate medical attention required".to_string()
    }

    /// Layer 3 title.
    pub fn age_adjusted_title(biomarker: &str, within: bool) -> String {
        if within {
            format!("{biomarker} within age-adjusted range")
        } else {
            format!("{biomarker} outside age-adjusted range")
        }
    }

    /// Layer 3, age-adjusted range flags a value the general range accepts.
    pub fn age_adjusted_abnormal(
        biomarker: &str,
        value: f64,
        unit: &str,
        band: &str,
        band_range: &str,
        high: bool,
    ) -> String {
        let direction = if high { "above" } else { "below" };
        format!(
            "{biomarker} {value} {unit} is {direction} the age-adjusted range for {band} ({band_range})",
        )
    }

    /// Layer 3, age-adjusted range accepts a value the general range flags.
    pub fn age_adjusted_within(
        biomarker: &str,
        value: f64,
        unit: &str,
        band: &str,
        band_range: &str,
    ) -> String {
        format!(
            "{biomarker} {value} {unit} is outside the general range but within the \
             age-adjusted range for {band} ({band_range})",
        )
    }

    pub fn age_adjusted_recommendation(biomarker: &str, within: bool) -> String {
        if within {
            format!("Interpret the {biomarker} deviation in light of age-specific norms")
        } else {
            format!("Evaluate {biomarker} against age-specific targets")
        }
    }

    /// Layer 4.
    pub fn medication_context_title(biomarker: &str) -> String {
        format!("{biomarker} abnormal despite treatment")
    }

    pub fn medication_context(biomarker: &str, medications: &[String]) -> String {
        format!(
            "{biomarker} remains abnormal despite active treatment with {}; \
             possible non-adherence or under-dosing",
            medications.join(", "),
        )
    }

    pub fn medication_context_recommendation() -> String {
        "Consider medication adjustment or compliance check".to_string()
    }

    /// Layer 5.
    pub fn trend_title(biomarker: &str, increasing: bool) -> String {
        if increasing {
            format!("Rapid rise in {biomarker}")
        } else {
            format!("Rapid fall in {biomarker}")
        }
    }

    pub fn trend(biomarker: &str, previous: f64, current: f64, unit: &str, pct_change: f64) -> String {
        format!(
            "{biomarker} changed from {previous} to {current} {unit} ({pct_change:+.1}%) \
             since the previous measurement",
        )
    }

    pub fn trend_recommendation(biomarker: &str) -> String {
        format!("Investigate cause of rapid {biomarker} change and schedule follow-up testing")
    }

    /// Layer 6 message: fills `{diagnoses}` in the pattern template.
    pub fn comorbidity(template: &str, diagnoses: &[String]) -> String {
        template.replace("{diagnoses}", &diagnoses.join(", "))
    }

    pub fn comorbidity_recommendation() -> String {
        "Comprehensive risk assessment for coexisting conditions".to_string()
    }

    /// Layer 7.
    pub fn interaction_title(drug_a: &str, drug_b: &str) -> String {
        format!("Drug interaction: {drug_a} + {drug_b}")
    }

    pub fn interaction(drug_a: &str, drug_b: &str, tier: &str, description: &str) -> String {
        format!("{drug_a} and {drug_b} ({tier} severity): {description}")
    }

    pub fn interaction_recommendation() -> String {
        "Consult physician".to_string()
    }
}
