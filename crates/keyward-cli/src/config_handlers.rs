//! Handler functions for config CLI commands.
//!
//! Implements `keyward config {path,show,init}`.

use crate::cli::ConfigAction;
use crate::config::KeywardConfig;
use keyward_core::{Error, Result};
use std::path::PathBuf;

// ============================================================================
// Command dispatch
// ============================================================================

/// Handle a config subcommand.
///
/// Receives the raw `--config` path (not a loaded config) because some
/// commands (path, init) work before a config file exists.
pub fn handle_config_command(config_path: Option<&str>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => {
            let path = cmd_config_path(config_path)?;
            println!("{}", path.display());
            if !path.exists() {
                eprintln!("(file does not exist; run `keyward config init` to create it)");
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = KeywardConfig::load(config_path)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        ConfigAction::Init { file, force } => {
            let path = cmd_config_init(file.as_deref(), force)?;
            println!("Config file created at {}", path.display());
            Ok(())
        }
    }
}

// ============================================================================
// Command handlers
// ============================================================================

/// Resolve the config file path.
fn cmd_config_path(config_path: Option<&str>) -> Result<PathBuf> {
    KeywardConfig::resolve_config_path(config_path).ok_or_else(|| {
        Error::config("Could not determine config directory for this platform")
    })
}

/// Create a default configuration file and return where it was written.
fn cmd_config_init(file: Option<&str>, force: bool) -> Result<PathBuf> {
    let path = match file {
        Some(p) => PathBuf::from(p),
        None => KeywardConfig::default_config_path()
            .ok_or_else(|| Error::config("Could not determine config directory"))?,
    };

    if path.exists() && !force {
        return Err(Error::config(format!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
    }

    let toml_str = KeywardConfig::default().to_toml_string()?;
    std::fs::write(&path, &toml_str).map_err(|e| Error::io_with_path(e, &path))?;
    Ok(path)
}

// ============================================================================
// Tests
// ============================================================================
