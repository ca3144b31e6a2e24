//! Configuration file support.
//!
//! Search order:
//! 1. Explicit path (`--config`)
//! 2. `sdis-report.json` in the working directory
//! 3. Built-in defaults
//!
//! All fields are optional. Command-line flags take precedence.

use crate::schema::{CanonicalField, ExtraField, Schema};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "sdis-report.json";
pub const DEFAULT_DATA_FILE: &str = "interventions2023.csv";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Source CSV file.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Directory receiving exported CSV and JSON files.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Extra header spellings, keyed by canonical field name
    /// (e.g. `"Region": ["Territoire"]`).
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,

    /// Numeric columns to carry beyond the built-in set.
    #[serde(default)]
    pub extra_numeric: Vec<ExtraField>,

    #[serde(default = "default_top_departments")]
    pub top_departments: usize,

    #[serde(default = "default_top_regions")]
    pub top_regions: usize,

    #[serde(default = "default_top_fires")]
    pub top_fires: usize,

    /// Rows shown in console previews.
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

fn default_data_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_FILE)
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_top_departments() -> usize {
    15
}

fn default_top_regions() -> usize {
    20
}

fn default_top_fires() -> usize {
    10
}

fn default_preview_rows() -> usize {
    5
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            data_path: default_data_path(),
            out_dir: default_out_dir(),
            synonyms: BTreeMap::new(),
            extra_numeric: Vec::new(),
            top_departments: default_top_departments(),
            top_regions: default_top_regions(),
            top_fires: default_top_fires(),
            preview_rows: default_preview_rows(),
        }
    }
}

impl ReportConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: ReportConfig = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path if given, else the default file in `dir` if present,
    /// else defaults.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            return Self::load_from_file(&candidate);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        for name in self.synonyms.keys() {
            if CanonicalField::from_name(name).is_none() {
                let known: Vec<&str> = CanonicalField::ALL.iter().map(|f| f.name()).collect();
                bail!(
                    "unknown canonical field '{}' in synonyms (expected one of: {})",
                    name,
                    known.join(", ")
                );
            }
        }
        for extra in &self.extra_numeric {
            if extra.name.trim().is_empty() {
                bail!("extra_numeric entry with an empty name");
            }
            if CanonicalField::from_name(&extra.name).is_some() {
                bail!("extra_numeric '{}' shadows a built-in field", extra.name);
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> Schema {
        let mut schema = Schema::default();
        for (name, spellings) in &self.synonyms {
            if let Some(field) = CanonicalField::from_name(name) {
                schema = schema.with_synonyms(field, spellings.iter().cloned());
            }
        }
        for extra in &self.extra_numeric {
            schema = schema.with_extra(extra.clone());
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_no_file() {
        let dir = TempDir::new().unwrap();
        let config = ReportConfig::discover(None, dir.path()).unwrap();
        assert_eq!(config.data_path, PathBuf::from(DEFAULT_DATA_FILE));
        assert_eq!(config.top_departments, 15);
        assert_eq!(config.top_regions, 20);
    }

    #[test]
    fn discovers_default_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            r#"{ "top_regions": 5, "synonyms": { "Region": ["Territoire"] } }"#,
        )
        .unwrap();
        let config = ReportConfig::discover(None, dir.path()).unwrap();
        assert_eq!(config.top_regions, 5);
        assert_eq!(config.top_fires, 10);
        let schema = config.schema();
        assert_eq!(schema.candidates(CanonicalField::Region)[0], "Territoire");
    }

    #[test]
    fn rejects_unknown_keys_and_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{ "nope": 1 }"#).unwrap();
        assert!(ReportConfig::load_from_file(&path).is_err());

        fs::write(&path, r#"{ "synonyms": { "Nowhere": ["x"] } }"#).unwrap();
        let err = ReportConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Nowhere"));
    }

    #[test]
    fn extra_numeric_reaches_schema() {
        let config = ReportConfig {
            extra_numeric: vec![ExtraField {
                name: "Risques_technologiques".to_string(),
                synonyms: vec![],
            }],
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.schema().extras().len(), 1);
    }

    #[test]
    fn extra_numeric_cannot_shadow_builtin() {
        let config = ReportConfig {
            extra_numeric: vec![ExtraField {
                name: "Incendies".to_string(),
                synonyms: vec![],
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
