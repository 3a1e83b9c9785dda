use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::reference::{parse_table, ReferenceParts, ReferenceTables};
use super::types::{EngineError, ReferenceError};

pub const RANGES_FILE: &str = "biomarker_ranges.json";
pub const INTERACTIONS_FILE: &str = "drug_interactions.json";
pub const PATTERNS_FILE: &str = "comorbidity_patterns.json";
pub const AXES_FILE: &str = "medication_axes.json";
pub const FORMULARY_FILE: &str = "formulary.json";
pub const TIERS_FILE: &str = "interaction_tiers.json";

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Data-access seam for reference tables. Storage technology is the
/// implementor's choice; the engine only sees validated tables.
pub trait ReferenceSource: Send + Sync {
    fn load(&self) -> Result<ReferenceTables, ReferenceError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Tables bundled with the crate.
pub struct BuiltinSource;

impl ReferenceSource for BuiltinSource {
    fn load(&self) -> Result<ReferenceTables, ReferenceError> {
        ReferenceTables::builtin()
    }

    fn describe(&self) -> String {
        "builtin".to_string()
    }
}

/// JSON tables in a directory. Ranges, interactions and patterns are
/// required; axes, formulary and tiers are optional.
pub struct JsonDirectorySource {
    dir: PathBuf,
}

impl JsonDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_required(&self, name: &str) -> Result<String, ReferenceError> {
        let path = self.dir.join(name);
        std::fs::read_to_string(&path)
            .map_err(|e| ReferenceError::Load(path.display().to_string(), e.to_string()))
    }

    fn read_optional(&self, name: &str) -> Result<Option<String>, ReferenceError> {
        let path = self.dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ReferenceError::Load(path.display().to_string(), e.to_string())),
        }
    }
}

impl ReferenceSource for JsonDirectorySource {
    fn load(&self) -> Result<ReferenceTables, ReferenceError> {
        let mut parts = ReferenceParts {
            biomarker_ranges: parse_table(RANGES_FILE, &self.read_required(RANGES_FILE)?)?,
            interaction_rules: parse_table(
                INTERACTIONS_FILE,
                &self.read_required(INTERACTIONS_FILE)?,
            )?,
            comorbidity_patterns: parse_table(PATTERNS_FILE, &self.read_required(PATTERNS_FILE)?)?,
            ..Default::default()
        };

        if let Some(json) = self.read_optional(AXES_FILE)? {
            parts.medication_axes = parse_table(AXES_FILE, &json)?;
        }
        if let Some(json) = self.read_optional(FORMULARY_FILE)? {
            parts.formulary = parse_table(FORMULARY_FILE, &json)?;
        }
        if let Some(json) = self.read_optional(TIERS_FILE)? {
            parts.interaction_tiers = Some(parse_table(TIERS_FILE, &json)?);
        }

        ReferenceTables::from_parts(parts)
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

// ---------------------------------------------------------------------------
// ReferenceStore
// ---------------------------------------------------------------------------

/// Process-wide holder of the active reference tables.
///
/// Readers clone the inner `Arc` and never hold the lock while evaluating.
/// Reload replaces the whole table set; tables are never mutated in place.
pub struct ReferenceStore {
    current: RwLock<Arc<ReferenceTables>>,
}

impl ReferenceStore {
    pub fn new(tables: ReferenceTables) -> Self {
        Self {
            current: RwLock::new(Arc::new(tables)),
        }
    }

    /// Consistent snapshot for one evaluation.
    pub fn snapshot(&self) -> Result<Arc<ReferenceTables>, EngineError> {
        let current = self.current.read().map_err(|_| EngineError::LockFailed)?;
        Ok(Arc::clone(&current))
    }

    /// Swap in a new table set. In-flight snapshots keep the old one.
    pub fn swap(&self, tables: ReferenceTables) -> Result<Arc<ReferenceTables>, EngineError> {
        let mut current = self.current.write().map_err(|_| EngineError::LockFailed)?;
        let previous = std::mem::replace(&mut *current, Arc::new(tables));
        Ok(previous)
    }

    /// Load from `source` and swap only if the whole set validates.
    pub fn reload(&self, source: &dyn ReferenceSource) -> Result<(), EngineError> {
        let tables = match source.load() {
            Ok(tables) => tables,
            Err(e) => {
                tracing::warn!(
                    source = %source.describe(),
                    error = %e,
                    "Reference reload rejected, keeping current tables"
                );
                return Err(e.into());
            }
        };

        let biomarkers = tables.biomarker_count();
        self.swap(tables)?;

        tracing::info!(
            source = %source.describe(),
            biomarkers,
            "Reference tables swapped"
        );
        Ok(())
    }
}
