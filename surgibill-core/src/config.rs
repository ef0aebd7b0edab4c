//! Configuration management
//!
//! Settings live in settings.json in the data directory:
//! ```json
//! {
//!   "app": { "businessUnit": "NORTH", "actor": "billing-admin", "validateReferences": true },
//!   ...
//! }
//! ```
//! Keys this crate does not manage are kept as-is when saving.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    business_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    actor: Option<String>,
    #[serde(default)]
    validate_references: bool,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Surgibill configuration (simplified view of settings)
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Default business unit for commands that take one
    pub business_unit: Option<String>,
    /// Recorded as created_by / updated_by on rule writes
    pub actor: Option<String>,
    /// Check rule references against registered reference data
    pub validate_references: bool,
}

impl Config {
    /// Load config from the data directory.
    ///
    /// A missing or malformed settings.json yields defaults. Each field can
    /// be overridden from the environment:
    /// SURGIBILL_BUSINESS_UNIT, SURGIBILL_ACTOR, SURGIBILL_VALIDATE_REFERENCES.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let raw = read_settings(data_dir)?;

        let business_unit = non_empty_env("SURGIBILL_BUSINESS_UNIT").or(raw.app.business_unit);
        let actor = non_empty_env("SURGIBILL_ACTOR").or(raw.app.actor);
        let validate_references =
            match std::env::var("SURGIBILL_VALIDATE_REFERENCES").ok().as_deref() {
                Some("true" | "1" | "yes" | "TRUE" | "YES") => true,
                Some("false" | "0" | "no" | "FALSE" | "NO") => false,
                _ => raw.app.validate_references,
            };

        Ok(Self {
            business_unit,
            actor,
            validate_references,
        })
    }

    /// Save config to the data directory
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let mut settings = read_settings(data_dir)?;

        settings.app.business_unit = self.business_unit.clone();
        settings.app.actor = self.actor.clone();
        settings.app.validate_references = self.validate_references;

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(data_dir.join("settings.json"), content)?;
        Ok(())
    }
}

fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let settings_path = data_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            business_unit: Some("SOUTH".to_string()),
            actor: None,
            validate_references: false,
        };
        config.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.business_unit.as_deref(), Some("SOUTH"));
        assert!(!loaded.validate_references);
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("settings.json"), "{not json").unwrap();
        assert!(Config::load(dir.path()).is_ok());
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"app": {"theme": "dark"}, "desktop": {"window": [800, 600]}}"#,
        )
        .unwrap();

        let config = Config {
            business_unit: Some("NORTH".to_string()),
            actor: Some("admin".to_string()),
            validate_references: true,
        };
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("settings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["app"]["theme"], "dark");
        assert_eq!(saved["app"]["businessUnit"], "NORTH");
        assert_eq!(saved["app"]["validateReferences"], true);
        assert_eq!(saved["desktop"]["window"][0], 800);
    }
}
