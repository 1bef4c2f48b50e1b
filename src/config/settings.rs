/// Settings loading from config.json
use crate::config::types::{LifecycleError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default settings file consulted when no explicit path is given
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/genctl/config.json";

/// Environment override for the settings file location
pub const SETTINGS_ENV: &str = "GENCTL_CONFIG";

/// Read-only settings consumed by every operation.
///
/// Unknown keys are rejected so typos surface instead of silently falling
/// back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory searched for `flake.nix` or `configuration.nix`
    pub config_location: PathBuf,
    /// Profile used when an operation does not name one
    pub default_profile: String,
    /// Show a closure diff with `nvd` before activating
    pub use_nvd: bool,
    /// Default root for `install` and `enter`
    pub root: PathBuf,
    /// Extra arguments appended to every builder invocation
    pub extra_build_args: Vec<String>,
    /// Link to the running system
    pub current_system: PathBuf,
    /// Debug logging and verbose builder output
    #[serde(skip)]
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_location: PathBuf::from("/etc/nixos"),
            default_profile: "system".to_string(),
            use_nvd: false,
            root: PathBuf::from("/mnt"),
            extra_build_args: Vec::new(),
            current_system: PathBuf::from("/run/current-system"),
            verbose: false,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LifecycleError::Config(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            LifecycleError::Config(format!(
                "Failed to parse settings file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Resolve settings: explicit path, then `$GENCTL_CONFIG`, then the
    /// default file if it exists, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        if let Some(path) = std::env::var_os(SETTINGS_ENV) {
            return Self::load_from_file(PathBuf::from(path));
        }

        let default_path = Path::new(DEFAULT_SETTINGS_PATH);
        if default_path.exists() {
            return Self::load_from_file(default_path);
        }

        log::debug!("No settings file found, using defaults");
        Ok(Self::default())
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_settings_fill_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "use_nvd": true, "root": "/target" }}"#).unwrap();

        let settings = Settings::load_from_file(file.path()).unwrap();
        assert!(settings.use_nvd);
        assert_eq!(settings.root, PathBuf::from("/target"));
        assert_eq!(settings.default_profile, "system");
        assert_eq!(settings.config_location, PathBuf::from("/etc/nixos"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "use_nvdd": true }}"#).unwrap();

        let err = Settings::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, LifecycleError::Config(_)));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let result = Settings::load(Some(Path::new("/nonexistent/genctl.json")));
        assert!(result.is_err());
    }
}
