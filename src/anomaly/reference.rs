use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::enums::{BiologicalSex, RangeVerdict, Urgency};
use crate::models::normalize_biomarker_type;

use super::types::ReferenceError;

// ---------------------------------------------------------------------------
// Table entry types (externally owned JSON shapes)
// ---------------------------------------------------------------------------

/// Reference range for one biomarker type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    #[serde(rename = "min")]
    pub normal_min: f64,
    #[serde(rename = "max")]
    pub normal_max: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub age_bands: Vec<AgeBand>,
}

/// Age interval `[min_age, max_age)` with its own normal bounds. The last band
/// of a table has no `max_age`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeBand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub min_age: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u32>,
    #[serde(rename = "min")]
    pub normal_min: f64,
    #[serde(rename = "max")]
    pub normal_max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_high: Option<f64>,
}

impl AgeBand {
    pub fn contains(&self, age: u32) -> bool {
        age >= self.min_age && self.max_age.map_or(true, |max| age < max)
    }

    pub fn display_label(&self) -> String {
        match (&self.label, self.max_age) {
            (Some(label), _) => label.clone(),
            (None, Some(max)) => format!("ages {}-{}", self.min_age, max.saturating_sub(1)),
            (None, None) => format!("ages {}+", self.min_age),
        }
    }
}

/// Drug-drug interaction between an unordered pair of canonical names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRule {
    pub drug1: String,
    pub drug2: String,
    /// Tier name, resolved through the interaction tier table.
    pub severity: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl InteractionRule {
    /// Symmetric match: (A, B) matches (B, A). Names must already be canonical.
    pub fn matches(&self, a: &str, b: &str) -> bool {
        (self.drug1 == a && self.drug2 == b) || (self.drug1 == b && self.drug2 == a)
    }
}

/// Score, urgency and criticality assigned to every interaction of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionTier {
    pub score: u8,
    pub urgency: Urgency,
    #[serde(default)]
    pub is_critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomarkerCondition {
    pub biomarker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below: Option<f64>,
}

impl BiomarkerCondition {
    pub fn holds(&self, value: f64) -> bool {
        self.above.map_or(true, |t| value > t) && self.below.map_or(true, |t| value < t)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComorbidityPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub required_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub biomarker_conditions: Vec<BiomarkerCondition>,
    pub severity: u8,
    /// May contain `{diagnoses}`, replaced with the matched diagnosis terms.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl ComorbidityPattern {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.required_categories.join(" + "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormularyEntry {
    pub generic_name: String,
    #[serde(default)]
    pub brand_names: Vec<String>,
}

// ---------------------------------------------------------------------------
// ResolvedRange
// ---------------------------------------------------------------------------

/// Range bounds in effect for one reading after key and age-band resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRange {
    /// Table key the range was found under (may be sex-specific).
    pub key: String,
    pub normal_min: f64,
    pub normal_max: f64,
    pub critical_low: Option<f64>,
    pub critical_high: Option<f64>,
    pub unit: String,
    /// Age band label, `None` for the default adult range.
    pub band: Option<String>,
}

impl ResolvedRange {
    /// Inclusive normal bounds: a value equal to a bound is normal.
    pub fn verdict(&self, value: f64) -> RangeVerdict {
        if value < self.normal_min {
            RangeVerdict::Low
        } else if value > self.normal_max {
            RangeVerdict::High
        } else {
            RangeVerdict::Normal
        }
    }

    pub fn describe(&self) -> String {
        let range = format!("{}-{}", self.normal_min, self.normal_max);
        if self.unit.is_empty() {
            range
        } else {
            format!("{range} {}", self.unit)
        }
    }

    fn from_range(key: &str, range: &ReferenceRange) -> Self {
        Self {
            key: key.to_string(),
            normal_min: range.normal_min,
            normal_max: range.normal_max,
            critical_low: range.critical_low,
            critical_high: range.critical_high,
            unit: range.unit.clone(),
            band: None,
        }
    }

    fn from_band(key: &str, range: &ReferenceRange, band: &AgeBand) -> Self {
        Self {
            key: key.to_string(),
            normal_min: band.normal_min,
            normal_max: band.normal_max,
            critical_low: band.critical_low.or(range.critical_low),
            critical_high: band.critical_high.or(range.critical_high),
            unit: range.unit.clone(),
            band: Some(band.display_label()),
        }
    }
}

// ---------------------------------------------------------------------------
// ReferenceTables
// ---------------------------------------------------------------------------

/// Unvalidated table contents, as read from a source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceParts {
    pub biomarker_ranges: BTreeMap<String, ReferenceRange>,
    pub interaction_rules: Vec<InteractionRule>,
    pub comorbidity_patterns: Vec<ComorbidityPattern>,
    pub medication_axes: BTreeMap<String, Vec<String>>,
    pub formulary: Vec<FormularyEntry>,
    /// `None` selects the default tier mapping.
    pub interaction_tiers: Option<BTreeMap<String, InteractionTier>>,
}

/// Validated, immutable reference data for one engine generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTables {
    ranges: BTreeMap<String, ReferenceRange>,
    interaction_rules: Vec<InteractionRule>,
    comorbidity_patterns: Vec<ComorbidityPattern>,
    medication_axes: BTreeMap<String, Vec<String>>,
    /// Lower-cased generic or brand name -> lower-cased generic name.
    formulary: BTreeMap<String, String>,
    interaction_tiers: BTreeMap<String, InteractionTier>,
}

const BUILTIN_RANGES: &str = include_str!("../../resources/reference/biomarker_ranges.json");
const BUILTIN_INTERACTIONS: &str = include_str!("../../resources/reference/drug_interactions.json");
const BUILTIN_PATTERNS: &str = include_str!("../../resources/reference/comorbidity_patterns.json");
const BUILTIN_AXES: &str = include_str!("../../resources/reference/medication_axes.json");
const BUILTIN_FORMULARY: &str = include_str!("../../resources/reference/formulary.json");
const BUILTIN_TIERS: &str = include_str!("../../resources/reference/interaction_tiers.json");

pub fn default_interaction_tiers() -> BTreeMap<String, InteractionTier> {
    BTreeMap::from([
        (
            "high".to_string(),
            InteractionTier {
                score: 85,
                urgency: Urgency::Urgent,
                is_critical: true,
            },
        ),
        (
            "moderate".to_string(),
            InteractionTier {
                score: 60,
                urgency: Urgency::Soon,
                is_critical: false,
            },
        ),
        (
            "low".to_string(),
            InteractionTier {
                score: 30,
                urgency: Urgency::Routine,
                is_critical: false,
            },
        ),
    ])
}

/// Parse one JSON table, tagging errors with the table's file name.
pub(crate) fn parse_table<T: serde::de::DeserializeOwned>(
    name: &str,
    json: &str,
) -> Result<T, ReferenceError> {
    serde_json::from_str(json).map_err(|e| ReferenceError::Parse(name.into(), e.to_string()))
}

impl ReferenceTables {
    /// Validate and normalize table contents. Any malformed entry fails the
    /// whole table set.
    pub fn from_parts(parts: ReferenceParts) -> Result<Self, ReferenceError> {
        let mut ranges = BTreeMap::new();
        for (raw_key, mut range) in parts.biomarker_ranges {
            let key = normalize_biomarker_type(&raw_key);
            range.age_bands.sort_by_key(|b| b.min_age);
            validate_range(&key, &range)?;
            ranges.insert(key, range);
        }

        let interaction_tiers: BTreeMap<String, InteractionTier> = parts
            .interaction_tiers
            .unwrap_or_else(default_interaction_tiers)
            .into_iter()
            .map(|(name, tier)| (name.trim().to_lowercase(), tier))
            .collect();
        for (name, tier) in &interaction_tiers {
            if tier.score > 100 {
                return Err(ReferenceError::InvalidTier {
                    tier: name.clone(),
                    reason: format!("score {} exceeds 100", tier.score),
                });
            }
        }

        let mut interaction_rules = Vec::with_capacity(parts.interaction_rules.len());
        for mut rule in parts.interaction_rules {
            rule.drug1 = canonical(&rule.drug1);
            rule.drug2 = canonical(&rule.drug2);
            rule.severity = rule.severity.trim().to_lowercase();
            if rule.drug1.is_empty() || rule.drug2.is_empty() {
                return Err(ReferenceError::InvalidInteraction {
                    drug1: rule.drug1,
                    drug2: rule.drug2,
                    reason: "drug names must not be empty".into(),
                });
            }
            if rule.drug1 == rule.drug2 {
                return Err(ReferenceError::InvalidInteraction {
                    drug1: rule.drug1,
                    drug2: rule.drug2,
                    reason: "a drug cannot interact with itself".into(),
                });
            }
            if !interaction_tiers.contains_key(&rule.severity) {
                return Err(ReferenceError::UnknownTier(rule.severity));
            }
            interaction_rules.push(rule);
        }

        let mut comorbidity_patterns = Vec::with_capacity(parts.comorbidity_patterns.len());
        for mut pattern in parts.comorbidity_patterns {
            pattern.required_categories = pattern
                .required_categories
                .iter()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect();
            validate_pattern(&mut pattern)?;
            comorbidity_patterns.push(pattern);
        }

        let medication_axes: BTreeMap<String, Vec<String>> = parts
            .medication_axes
            .into_iter()
            .map(|(key, drugs)| {
                let drugs = drugs
                    .iter()
                    .map(|d| canonical(d))
                    .filter(|d| !d.is_empty())
                    .collect::<Vec<_>>();
                (normalize_biomarker_type(&key), drugs)
            })
            .collect();

        let mut formulary = BTreeMap::new();
        for entry in parts.formulary {
            let generic = canonical(&entry.generic_name);
            if generic.is_empty() {
                continue;
            }
            for brand in &entry.brand_names {
                let brand = canonical(brand);
                if !brand.is_empty() {
                    formulary.insert(brand, generic.clone());
                }
            }
            formulary.insert(generic.clone(), generic);
        }

        Ok(Self {
            ranges,
            interaction_rules,
            comorbidity_patterns,
            medication_axes,
            formulary,
            interaction_tiers,
        })
    }

    /// Tables bundled with the crate.
    pub fn builtin() -> Result<Self, ReferenceError> {
        Self::from_parts(ReferenceParts {
            biomarker_ranges: parse_table("biomarker_ranges.json", BUILTIN_RANGES)?,
            interaction_rules: parse_table("drug_interactions.json", BUILTIN_INTERACTIONS)?,
            comorbidity_patterns: parse_table("comorbidity_patterns.json", BUILTIN_PATTERNS)?,
            medication_axes: parse_table("medication_axes.json", BUILTIN_AXES)?,
            formulary: parse_table("formulary.json", BUILTIN_FORMULARY)?,
            interaction_tiers: Some(parse_table("interaction_tiers.json", BUILTIN_TIERS)?),
        })
    }

    /// Empty tables: every reading is unknown, nothing interacts.
    pub fn empty() -> Self {
        Self {
            ranges: BTreeMap::new(),
            interaction_rules: Vec::new(),
            comorbidity_patterns: Vec::new(),
            medication_axes: BTreeMap::new(),
            formulary: BTreeMap::new(),
            interaction_tiers: default_interaction_tiers(),
        }
    }

    /// Resolve the range for a biomarker at a given age: the age band
    /// containing `age`, or the default adult range when the type has no bands.
    pub fn get_range(&self, biomarker_type: &str, age: u32) -> Result<ResolvedRange, ReferenceError> {
        self.get_range_for(biomarker_type, age, BiologicalSex::Unknown)
    }

    /// Like [`get_range`](Self::get_range), preferring a `{type}_{sex}` entry.
    pub fn get_range_for(
        &self,
        biomarker_type: &str,
        age: u32,
        sex: BiologicalSex,
    ) -> Result<ResolvedRange, ReferenceError> {
        let (key, range) = self.lookup(biomarker_type, sex)?;
        Ok(match range.age_bands.iter().find(|b| b.contains(age)) {
            Some(band) => ResolvedRange::from_band(key, range, band),
            None => ResolvedRange::from_range(key, range),
        })
    }

    /// The general (not age-adjusted) range for a biomarker.
    pub fn generic_range(
        &self,
        biomarker_type: &str,
        sex: BiologicalSex,
    ) -> Result<ResolvedRange, ReferenceError> {
        let (key, range) = self.lookup(biomarker_type, sex)?;
        Ok(ResolvedRange::from_range(key, range))
    }

    fn lookup(
        &self,
        biomarker_type: &str,
        sex: BiologicalSex,
    ) -> Result<(&str, &ReferenceRange), ReferenceError> {
        let key = normalize_biomarker_type(biomarker_type);
        if matches!(sex, BiologicalSex::Male | BiologicalSex::Female) {
            let sexed = format!("{key}_{}", sex.as_str());
            if let Some((k, range)) = self.ranges.get_key_value(&sexed) {
                return Ok((k.as_str(), range));
            }
        }
        self.ranges
            .get_key_value(&key)
            .map(|(k, range)| (k.as_str(), range))
            .ok_or(ReferenceError::UnknownBiomarkerType(key))
    }

    /// Resolve a medication name to its canonical generic name. Without a
    /// formulary every trimmed, lower-cased name is canonical.
    pub fn resolve_medication(&self, name: &str) -> Option<String> {
        let lower = canonical(name);
        if lower.is_empty() {
            return None;
        }
        if self.formulary.is_empty() {
            return Some(lower);
        }
        self.formulary.get(&lower).cloned()
    }

    /// Symmetric lookup of every rule covering the pair.
    pub fn interactions_for<'a>(
        &'a self,
        a: &'a str,
        b: &'a str,
    ) -> impl Iterator<Item = &'a InteractionRule> + 'a {
        self.interaction_rules.iter().filter(move |r| r.matches(a, b))
    }

    pub fn tier(&self, name: &str) -> Option<&InteractionTier> {
        self.interaction_tiers.get(&name.trim().to_lowercase())
    }

    /// Drug keywords treating the physiological axis of a biomarker.
    pub fn medications_targeting(&self, biomarker_type: &str) -> &[String] {
        self.medication_axes
            .get(&normalize_biomarker_type(biomarker_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn comorbidity_patterns(&self) -> &[ComorbidityPattern] {
        &self.comorbidity_patterns
    }

    pub fn interaction_rules(&self) -> &[InteractionRule] {
        &self.interaction_rules
    }

    pub fn biomarker_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn formulary_size(&self) -> usize {
        self.formulary.values().collect::<std::collections::BTreeSet<_>>().len()
    }
}

fn canonical(name: &str) -> String {
    name.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_bounds(
    biomarker: &str,
    normal_min: f64,
    normal_max: f64,
    critical_low: Option<f64>,
    critical_high: Option<f64>,
) -> Result<(), ReferenceError> {
    let invalid = |reason: String| ReferenceError::InvalidRange {
        biomarker: biomarker.to_string(),
        reason,
    };

    let all = [Some(normal_min), Some(normal_max), critical_low, critical_high];
    if all.iter().flatten().any(|v| !v.is_finite()) {
        return Err(invalid("bounds must be finite numbers".into()));
    }
    if normal_min > normal_max {
        return Err(invalid(format!("min {normal_min} > max {normal_max}")));
    }
    if let Some(low) = critical_low {
        if low > normal_min {
            return Err(invalid(format!(
                "critical_low {low} lies inside the normal range (min {normal_min})"
            )));
        }
    }
    if let Some(high) = critical_high {
        if high < normal_max {
            return Err(invalid(format!(
                "critical_high {high} lies inside the normal range (max {normal_max})"
            )));
        }
    }
    Ok(())
}

fn validate_range(key: &str, range: &ReferenceRange) -> Result<(), ReferenceError> {
    validate_bounds(
        key,
        range.normal_min,
        range.normal_max,
        range.critical_low,
        range.critical_high,
    )?;

    if range.age_bands.is_empty() {
        return Ok(());
    }

    let bands_error = |reason: String| ReferenceError::InvalidAgeBands {
        biomarker: key.to_string(),
        reason,
    };

    // Bands arrive sorted by min_age.
    if range.age_bands[0].min_age != 0 {
        return Err(bands_error(format!(
            "first band starts at {} instead of 0",
            range.age_bands[0].min_age
        )));
    }

    let last = range.age_bands.len() - 1;
    for (i, band) in range.age_bands.iter().enumerate() {
        validate_bounds(
            key,
            band.normal_min,
            band.normal_max,
            band.critical_low.or(range.critical_low),
            band.critical_high.or(range.critical_high),
        )?;

        match band.max_age {
            Some(max) if max <= band.min_age => {
                return Err(bands_error(format!(
                    "band starting at {} ends at {max}",
                    band.min_age
                )));
            }
            Some(max) if i == last => {
                return Err(bands_error(format!(
                    "last band ends at {max}; ages above are not covered"
                )));
            }
            Some(max) => {
                let next = range.age_bands[i + 1].min_age;
                if next < max {
                    return Err(bands_error(format!(
                        "bands overlap: [{}, {max}) and a band starting at {next}",
                        band.min_age
                    )));
                }
                if next > max {
                    return Err(bands_error(format!("ages {max}-{} are not covered", next - 1)));
                }
            }
            None if i != last => {
                return Err(bands_error(format!(
                    "open-ended band starting at {} is followed by another band",
                    band.min_age
                )));
            }
            None => {}
        }
    }

    Ok(())
}

fn validate_pattern(pattern: &mut ComorbidityPattern) -> Result<(), ReferenceError> {
    let name = pattern.display_name();
    let invalid = |reason: &str| ReferenceError::InvalidPattern {
        pattern: name.clone(),
        reason: reason.to_string(),
    };

    if pattern.required_categories.is_empty() {
        return Err(invalid("required_categories must not be empty"));
    }
    if pattern.severity > 100 {
        return Err(invalid("severity must be within 0-100"));
    }
    for condition in &mut pattern.biomarker_conditions {
        condition.biomarker = normalize_biomarker_type(&condition.biomarker);
        if condition.above.is_none() && condition.below.is_none() {
            return Err(invalid("biomarker condition needs `above` or `below`"));
        }
    }
    Ok(())
}
