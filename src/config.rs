use std::path::PathBuf;

use crate::anomaly::store::{BuiltinSource, JsonDirectorySource, ReferenceSource, RANGES_FILE};

/// Application-level constants
pub const APP_NAME: &str = "Vigilant";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Overrides the reference table directory.
pub const REFERENCE_DIR_ENV: &str = "VIGILANT_REFERENCE_DIR";

/// Get the application data directory.
/// ~/Vigilant/ on all platforms; falls back to the working directory when no
/// home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Directory holding the reference tables.
pub fn reference_dir() -> PathBuf {
    reference_dir_from(std::env::var_os(REFERENCE_DIR_ENV).map(PathBuf::from))
}

fn reference_dir_from(override_dir: Option<PathBuf>) -> PathBuf {
    override_dir
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| app_data_dir().join("reference"))
}

/// Reference source for a directory: the directory when it holds a range
/// table, the built-in tables otherwise.
pub fn reference_source(dir: Option<PathBuf>) -> Box<dyn ReferenceSource> {
    let dir = dir.unwrap_or_else(reference_dir);
    if dir.join(RANGES_FILE).is_file() {
        Box::new(JsonDirectorySource::new(dir))
    } else {
        tracing::debug!(dir = %dir.display(), "No reference tables found, using built-in tables");
        Box::new(BuiltinSource)
    }
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "vigilant_lib=info,vigilant=info"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_named_after_app() {
        assert!(app_data_dir().ends_with("Vigilant"));
    }

    #[test]
    fn reference_dir_under_app_data_by_default() {
        let dir = reference_dir_from(None);
        assert!(dir.starts_with(app_data_dir()));
        assert!(dir.ends_with("reference"));
    }

    #[test]
    fn reference_dir_override_wins() {
        let dir = reference_dir_from(Some(PathBuf::from("/srv/tables")));
        assert_eq!(dir, PathBuf::from("/srv/tables"));

        let empty = reference_dir_from(Some(PathBuf::new()));
        assert!(empty.ends_with("reference"));
    }

    #[test]
    fn reference_source_prefers_directory_with_tables() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(reference_source(Some(tmp.path().to_path_buf())).describe(), "builtin");

        std::fs::write(tmp.path().join(RANGES_FILE), "{}").unwrap();
        let source = reference_source(Some(tmp.path().to_path_buf()));
        assert_eq!(source.describe(), tmp.path().display().to_string());
    }

    #[test]
    fn app_name_is_vigilant() {
        assert_eq!(APP_NAME, "Vigilant");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn log_filter_covers_both_targets() {
        assert!(default_log_filter().contains("vigilant_lib="));
        assert!(default_log_filter().contains("vigilant="));
    }
}
