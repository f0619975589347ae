// Path: crates/osd-types/src/config/mod.rs

//! Configuration for an object storage target instance.

use crate::consts::MAX_ATTR_VAL_LEN;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level target configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Root directory holding the database and object data.
    pub root: PathBuf,
    /// File name of the attribute/catalog database below `root`.
    #[serde(default = "default_db_file")]
    pub db_file: String,
    /// Directory below `root` holding one data file per user object.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Largest attribute value accepted by a set.
    #[serde(default = "default_max_attr_len")]
    pub max_attr_len: usize,
    /// Upper bound on a single response buffer.
    #[serde(default = "default_max_cdb_data_len")]
    pub max_cdb_data_len: u64,
    /// Whether FLUSH commands `fsync` object data.
    #[serde(default)]
    pub sync_data: bool,
}

fn default_db_file() -> String {
    "osd.redb".to_string()
}
fn default_data_dir() -> String {
    "dfiles".to_string()
}
fn default_max_attr_len() -> usize {
    MAX_ATTR_VAL_LEN
}
fn default_max_cdb_data_len() -> u64 {
    1 << 30
}

impl TargetConfig {
    /// A configuration with every default applied under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            db_file: default_db_file(),
            data_dir: default_data_dir(),
            max_attr_len: default_max_attr_len(),
            max_cdb_data_len: default_max_cdb_data_len(),
            sync_data: false,
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_file.is_empty() || self.data_dir.is_empty() {
            return Err(ConfigError::Invalid(
                "db_file and data_dir must be non-empty".into(),
            ));
        }
        if self.max_attr_len == 0 || self.max_attr_len > MAX_ATTR_VAL_LEN {
            return Err(ConfigError::Invalid(format!(
                "max_attr_len must be in 1..={MAX_ATTR_VAL_LEN}"
            )));
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(&self.db_file)
    }

    pub fn data_path(&self) -> PathBuf {
        self.root.join(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = TargetConfig::from_toml_str(r#"root = "/var/lib/osd""#).unwrap();
        assert_eq!(cfg, TargetConfig::new("/var/lib/osd"));
        assert_eq!(cfg.db_path(), PathBuf::from("/var/lib/osd/osd.redb"));
        assert_eq!(cfg.data_path(), PathBuf::from("/var/lib/osd/dfiles"));
    }

    #[test]
    fn rejects_oversized_attribute_limit() {
        let err = TargetConfig::from_toml_str(
            r#"
            root = "/tmp/osd"
            max_attr_len = 70000
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.toml");
        std::fs::write(&path, "root = \"/srv/osd\"\nsync_data = true\n").unwrap();
        let cfg = TargetConfig::load(&path).unwrap();
        assert!(cfg.sync_data);
        assert_eq!(cfg.db_file, "osd.redb");
    }
}
