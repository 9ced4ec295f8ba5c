//! Configuration for the Keyward CLI.
//!
//! Provides the [`KeywardConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `KEYWARD_CONFIG` environment variable
//! 3. XDG default: `~/.config/keyward/config.toml`
//! 4. Built-in defaults

use confyg::{Confygery, env};
use keyward_acl::StoreConfig;
use keyward_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "KEYWARD_CONFIG";

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for the Keyward CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywardConfig {
    /// Durable journal settings.
    pub journal: JournalConfig,

    /// Store settings.
    pub store: StoreConfig,
}

/// Journal location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Path to the journal file. Defaults to the platform data directory.
    pub path: Option<String>,
}

// ============================================================================
// Config loading
// ============================================================================

impl KeywardConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut env_opts = env::Options::with_top_level("KEYWARD");
        env_opts.add_section("journal");
        env_opts.add_section("store");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }
        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("keyward").join("config.toml"))
    }

    /// Return the default journal path under the platform data directory.
    pub fn default_journal_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("keyward").join("keyward.journal"))
    }

    /// The journal to use: `--journal`, then config, then the default.
    pub fn journal_path(&self, explicit: Option<&str>) -> Result<PathBuf> {
        explicit
            .or(self.journal.path.as_deref())
            .map(PathBuf::from)
            .or_else(Self::default_journal_path)
            .ok_or_else(|| {
                Error::config("Could not determine a journal path; pass --journal or set journal.path")
            })
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_keyward_config_default() {
        let config = KeywardConfig::default();
        assert!(config.journal.path.is_none());
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_keyward_config_from_toml() {
        let toml_str = r#"
            [journal]
            path = "/var/lib/keyward/keyward.journal"

            [store]
            access_key_length = 20
            validate_transfer_target = true
        "#;

        let config: KeywardConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.journal.path.as_deref(),
            Some("/var/lib/keyward/keyward.journal")
        );
        assert_eq!(config.store.access_key_length, 20);
        assert_eq!(config.store.secret_key_length, 32);
        assert!(config.store.validate_transfer_target);
    }

    #[test]
    fn test_keyward_config_to_toml() {
        let config = KeywardConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("access_key_length = 16"));

        let parsed: KeywardConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_keyward_config_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
                [journal]
                path = "/tmp/loaded.journal"
            "#,
        )
        .unwrap();

        let config = KeywardConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.journal.path.as_deref(), Some("/tmp/loaded.journal"));
    }

    #[test]
    fn test_keyward_config_load_defaults() {
        let config = KeywardConfig::load(Some("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_resolve_config_path_explicit() {
        let path = KeywardConfig::resolve_config_path(Some("/explicit/config.toml"));
        assert_eq!(path, Some(PathBuf::from("/explicit/config.toml")));
    }

    #[test]
    fn test_journal_path_precedence() {
        let config = KeywardConfig {
            journal: JournalConfig {
                path: Some("/from/config.journal".into()),
            },
            ..KeywardConfig::default()
        };
        assert_eq!(
            config.journal_path(Some("/from/flag.journal")).unwrap(),
            PathBuf::from("/from/flag.journal")
        );
        assert_eq!(
            config.journal_path(None).unwrap(),
            PathBuf::from("/from/config.journal")
        );
    }
}
