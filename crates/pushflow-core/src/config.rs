//! Push update settings: defaults, environment overrides and a JSON file store.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PushError, PushResult};
use crate::push::collaborators::SettingsStore;

/// How a rejected branch is brought up to date with its remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMethod {
    #[default]
    Merge,
    Rebase,
}

impl UpdateMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Rebase => "rebase",
        }
    }
}

impl FromStr for UpdateMethod {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "rebase" => Ok(Self::Rebase),
            other => Err(PushError::Settings(format!("unknown update method: {other}"))),
        }
    }
}

/// Settings chosen for the update step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateSettings {
    pub method: UpdateMethod,
    /// Update every tracked repository, not just the rejected ones.
    pub update_all_roots: bool,
}

/// Persistent push behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PushSettings {
    /// Update and retry without asking when a push is rejected.
    pub auto_update_on_rejection: bool,
    pub update_method: UpdateMethod,
    pub update_all_roots: bool,
}

impl PushSettings {
    pub fn update_settings(&self) -> UpdateSettings {
        UpdateSettings {
            method: self.update_method,
            update_all_roots: self.update_all_roots,
        }
    }

    pub fn with_update_settings(mut self, settings: UpdateSettings) -> Self {
        self.update_method = settings.method;
        self.update_all_roots = settings.update_all_roots;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - PUSHFLOW_AUTO_UPDATE (optional, default: "false")
    /// - PUSHFLOW_UPDATE_METHOD (optional, "merge" or "rebase", default: "merge")
    /// - PUSHFLOW_UPDATE_ALL_ROOTS (optional, default: "false")
    pub fn from_env() -> PushResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply any `PUSHFLOW_*` variables on top of `self`.
    pub fn with_env_overrides(mut self) -> PushResult<Self> {
        if let Ok(v) = std::env::var("PUSHFLOW_AUTO_UPDATE") {
            self.auto_update_on_rejection = parse_flag(&v);
        }
        if let Ok(v) = std::env::var("PUSHFLOW_UPDATE_METHOD") {
            self.update_method = v.parse()?;
        }
        if let Ok(v) = std::env::var("PUSHFLOW_UPDATE_ALL_ROOTS") {
            self.update_all_roots = parse_flag(&v);
        }
        Ok(self)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Settings persisted as pretty JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults when the file does not exist.
    pub fn load(&self) -> PushResult<PushSettings> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PushSettings::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, settings: &PushSettings) -> PushResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn save_update_settings(&self, settings: &UpdateSettings) -> PushResult<()> {
        let current = self.load()?;
        self.save(&current.with_update_settings(*settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_method_parse() {
        assert_eq!("merge".parse::<UpdateMethod>().unwrap(), UpdateMethod::Merge);
        assert_eq!(" Rebase ".parse::<UpdateMethod>().unwrap(), UpdateMethod::Rebase);
        assert!("squash".parse::<UpdateMethod>().is_err());
    }

    #[test]
    fn test_defaults() {
        let settings = PushSettings::default();
        assert!(!settings.auto_update_on_rejection);
        assert_eq!(settings.update_method, UpdateMethod::Merge);
        assert!(!settings.update_all_roots);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("settings.json"));
        assert_eq!(store.load().unwrap(), PushSettings::default());
    }

    #[test]
    fn test_save_update_settings_keeps_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("nested").join("settings.json"));
        store
            .save(&PushSettings {
                auto_update_on_rejection: true,
                ..PushSettings::default()
            })
            .unwrap();

        store
            .save_update_settings(&UpdateSettings {
                method: UpdateMethod::Rebase,
                update_all_roots: true,
            })
            .unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.auto_update_on_rejection);
        assert_eq!(loaded.update_method, UpdateMethod::Rebase);
        assert!(loaded.update_all_roots);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "update_method": "rebase" }"#).unwrap();
        let loaded = JsonSettingsStore::new(&path).load().unwrap();
        assert_eq!(loaded.update_method, UpdateMethod::Rebase);
        assert!(!loaded.auto_update_on_rejection);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("no"));
    }
}
