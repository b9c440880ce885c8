//! Fuse configuration files.
//!
//! A fuse file is a flat TOML table mapping fuse names to integers:
//!
//! ```toml
//! conf_word = 16383
//! user_id0 = 0xFFFF
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::error::ErrorKind;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Couldn't access config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Couldn't parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Couldn't serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Missing value for `{0}`")]
    MissingKey(String),
    #[error("Value for `{name}` is not a 32-bit unsigned integer: {value}")]
    InvalidValue { name: String, value: i64 },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Io { .. } | ConfigError::Serialize(_) => ErrorKind::Transport,
            ConfigError::Parse { .. }
            | ConfigError::MissingKey(_)
            | ConfigError::InvalidValue { .. } => ErrorKind::Usage,
        }
    }
}

/// Name → integer mapping backed by a file.
#[derive(Debug)]
pub struct FuseConfig {
    path: PathBuf,
    values: BTreeMap<String, u32>,
    dirty: bool,
}

impl FuseConfig {
    /// Start an empty configuration that will be written to `path` on close.
    pub fn create<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            values: BTreeMap::new(),
            dirty: true,
        }
    }

    /// Load an existing configuration.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let raw: BTreeMap<String, i64> =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;

        let mut values = BTreeMap::new();
        for (name, value) in raw {
            let value = u32::try_from(value).map_err(|_| ConfigError::InvalidValue {
                name: name.clone(),
                value,
            })?;
            values.insert(name, value);
        }
        debug!(path = %path.display(), entries = values.len(), "Loaded fuse config");

        Ok(Self {
            path,
            values,
            dirty: false,
        })
    }

    pub fn get_int(&self, name: &str) -> Result<u32, ConfigError> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::MissingKey(name.to_string()))
    }

    pub fn set_int(&mut self, name: &str, value: u32) {
        self.values.insert(name.to_string(), value);
        self.dirty = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn values(&self) -> &BTreeMap<String, u32> {
        &self.values
    }

    /// Flush pending changes to disk.
    pub fn close(self) -> Result<(), ConfigError> {
        if !self.dirty {
            return Ok(());
        }
        let content = toml::to_string(&self.values)?;
        std::fs::write(&self.path, content).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), entries = self.values.len(), "Saved fuse config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuses.conf");

        let mut config = FuseConfig::create(&path);
        config.set_int("conf_word", 0x3FFF);
        config.set_int("lock_byte", 0xFC);
        config.set_int("fuses", 0xFFFF_FFFF);
        config.close().unwrap();

        let loaded = FuseConfig::open(&path).unwrap();
        assert_eq!(loaded.get_int("conf_word").unwrap(), 0x3FFF);
        assert_eq!(loaded.get_int("lock_byte").unwrap(), 0xFC);
        assert_eq!(loaded.get_int("fuses").unwrap(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_hex_values_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuses.conf");
        std::fs::write(&path, "user_id0 = 0xBEEF\n").unwrap();

        let config = FuseConfig::open(&path).unwrap();
        assert_eq!(config.get_int("user_id0").unwrap(), 0xBEEF);
        let err = config.get_int("user_id1").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref name) if name == "user_id1"));
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn test_negative_value_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuses.conf");
        std::fs::write(&path, "fuses = -1\n").unwrap();

        assert!(matches!(
            FuseConfig::open(&path),
            Err(ConfigError::InvalidValue { value: -1, .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FuseConfig::open(dir.path().join("absent.conf")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
