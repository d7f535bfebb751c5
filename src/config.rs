//! Settings file handling for the debugger front-end.
//!
//! Settings live in `amidev.json` next to the project being debugged. A
//! missing file means built-in defaults; a malformed file is an error
//! rather than a silent fallback.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AmidevError, Result};

/// Default settings file name, looked up in the working directory
pub const SETTINGS_FILE: &str = "amidev.json";

/// How to launch the emulator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmulatorSettings {
    /// Emulator executable; resolved through PATH when not absolute
    pub executable: String,
    /// Extra arguments prepended to every launch
    pub args: Vec<String>,
}

impl Default for EmulatorSettings {
    fn default() -> Self {
        Self {
            executable: "fs-uae".to_string(),
            args: vec![],
        }
    }
}

/// Tool settings that can be saved/loaded
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub emulator: EmulatorSettings,
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve settings for a session: an explicit path must exist, the
    /// default path may be absent.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from_file(path),
            None => {
                let default = Path::new(SETTINGS_FILE);
                if default.exists() {
                    debug!("using settings from {}", default.display());
                    Self::load_from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<()> {
        if self.emulator.executable.trim().is_empty() {
            return Err(AmidevError::settings("emulator executable is empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.emulator.executable, "fs-uae");
        assert!(settings.emulator.args.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("amidev.json");

        let mut settings = Settings::default();
        settings.emulator.args = vec!["--fullscreen=0".to_string()];
        settings.save_to_file(&path).unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("amidev.json");
        fs::write(&path, r#"{"emulator": {"args": ["-c"]}}"#).unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded.emulator.executable, "fs-uae");
        assert_eq!(loaded.emulator.args, vec!["-c".to_string()]);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("amidev.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Settings::load_from_file(&path),
            Err(AmidevError::Json(_))
        ));
    }

    #[test]
    fn test_empty_executable_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("amidev.json");
        fs::write(&path, r#"{"emulator": {"executable": "  "}}"#).unwrap();
        assert!(matches!(
            Settings::load_from_file(&path),
            Err(AmidevError::Settings(_))
        ));
    }
}
