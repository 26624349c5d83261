use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::ParameterOverrides;
use crate::error::{AlgodocError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library scanning
    pub scan: ScanConfig,

    /// Category display labels
    pub categories: CategoryConfig,

    /// Code synthesis settings
    pub synthesis: SynthesisConfig,

    /// Per-entry parameter overrides, keyed by entry id then parameter name
    pub overrides: BTreeMap<String, ParameterOverrides>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Root package directory of the function library
    pub root: PathBuf,

    /// Also catalog functions whose names start with `_`
    pub include_private: bool,

    /// Maximum module size to read (in bytes)
    pub max_file_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    /// Category key to human-readable label
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Import line emitted first when an entry handles tabular data
    pub tabular_import: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("algorithm"),
            include_private: false,
            max_file_size: 1024 * 1024, // 1MB
        }
    }
}

impl Default for CategoryConfig {
    fn default() -> Self {
        let labels = [
            ("load_data", "Load Data"),
            ("data_operation", "Data Operations"),
            ("data_preprocessing", "Data Preprocessing"),
            ("eda", "Exploratory Analysis"),
            ("anomaly_detection", "Anomaly Detection"),
            ("trend_plot", "Trend Plots"),
            ("plotting", "Plotting"),
        ]
        .into_iter()
        .map(|(key, label)| (key.to_string(), label.to_string()))
        .collect();

        Self { labels }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            tabular_import: "import pandas as pd".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| AlgodocError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AlgodocError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Algodoc.toml",
                    "algodoc.toml",
                    ".algodoc.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    /// Overrides declared for one entry, if any
    pub fn overrides_for(&self, entry_id: &str) -> Option<&ParameterOverrides> {
        self.overrides.get(entry_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Literal, Widget};
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("algodoc.toml");
        std::fs::write(
            &path,
            r#"
[scan]
root = "lib/algorithm"

[categories.labels]
eda = "EDA"

[overrides.rolling_mean.window]
label = "Window Size"
default = 7
widget = "input-number"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.scan.root, PathBuf::from("lib/algorithm"));
        assert_eq!(config.scan.max_file_size, 1024 * 1024);
        assert_eq!(config.categories.labels.get("eda").map(String::as_str), Some("EDA"));
        assert_eq!(config.synthesis.tabular_import, "import pandas as pd");

        let window = &config.overrides_for("rolling_mean").unwrap()["window"];
        assert_eq!(window.label.as_deref(), Some("Window Size"));
        assert_eq!(window.default, Some(Literal::Int(7)));
        assert_eq!(window.widget, Some(Widget::InputNumber));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Algodoc.toml");

        let mut config = Config::default();
        config.scan.include_private = true;
        config.save(&path).unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_missing_explicit_path_uses_defaults() {
        let config = Config::load_or_default(Some("does/not/exist.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("algodoc.toml");
        std::fs::write(&path, "[scan\nroot = 1").unwrap();
        assert!(matches!(Config::load(&path), Err(AlgodocError::Config(_))));
    }
}
