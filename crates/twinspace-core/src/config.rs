//! Server configuration
//!
//! Loaded from a TOML file at startup; every field has a default so a
//! partial file (or none at all) still yields a runnable server.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwinspaceConfig {
    /// Tenant space stamped into every server-assigned key.
    pub space: String,
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    pub storage: StorageConfig,
    pub paging: PagingConfig,
    pub dispatch: DispatchConfig,
}

impl Default for TwinspaceConfig {
    fn default() -> Self {
        Self {
            space: "twinspace".to_string(),
            bind_addr: "127.0.0.1:8085".to_string(),
            storage: StorageConfig::default(),
            paging: PagingConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the sqlite database file.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "twinspace.db".to_string(),
        }
    }
}

/// Defaults for the paged listing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub default_size: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self { default_size: 20 }
    }
}

/// Background operation dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Bounded queue capacity; a full queue rejects new async work.
    pub queue_capacity: usize,
    /// Number of worker threads draining the queue.
    pub workers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            workers: 2,
        }
    }
}

impl TwinspaceConfig {
    /// Parse a TOML document; absent keys fall back to defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| Error::Validation(format!("config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Validation(format!("config: {}", e)))
    }

    /// Load from a TOML file, or defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Validation(format!("config {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.space.is_empty() {
            return Err(Error::Validation("space must not be empty".into()));
        }
        if self.paging.default_size == 0 {
            return Err(Error::Validation("default page size must be positive".into()));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(Error::Validation("queue capacity must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TwinspaceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.paging.default_size, 20);
    }

    #[test]
    fn toml_round_trip() {
        let config = TwinspaceConfig::default();
        let toml = config.to_toml().unwrap();
        let parsed = TwinspaceConfig::from_toml(&toml).unwrap();
        assert_eq!(parsed.space, config.space);
        assert_eq!(parsed.dispatch.workers, config.dispatch.workers);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let parsed = TwinspaceConfig::from_toml(
            r#"
            space = "plant-7"

            [dispatch]
            workers = 8
            "#,
        )
        .unwrap();
        assert_eq!(parsed.space, "plant-7");
        assert_eq!(parsed.dispatch.workers, 8);
        assert_eq!(parsed.bind_addr, "127.0.0.1:8085");
        assert_eq!(parsed.paging.default_size, 20);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(TwinspaceConfig::from_toml(r#"space = """#).is_err());
        let err = TwinspaceConfig::from_toml(
            r#"
            [dispatch]
            queue_capacity = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = TwinspaceConfig::load("/nonexistent/twinspace.toml").unwrap();
        assert_eq!(config.space, "twinspace");
    }
}
