//! KeywardCli application.
//!
//! Each invocation replays the journal into a fresh [`AuthorizationStore`],
//! runs one command against it, and prints the result as JSON on stdout.
//! Mutations are proposed to the same journal, so the next invocation sees
//! them.

use crate::cli::{CliArgs, Command};
use crate::config::KeywardConfig;
use crate::config_handlers;
use keyward_acl::{AuthorizationStore, FileJournal};
use keyward_core::{CredentialRecord, Error, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// ============================================================================
// KeywardCli
// ============================================================================

/// The `keyward` command-line application.
pub struct KeywardCli {
    config: KeywardConfig,
    version: String,
}

impl KeywardCli {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let config = KeywardConfig::load(args.config.as_deref())?;
        Ok(Self::new(config))
    }

    /// Create with an already loaded config.
    pub fn new(config: KeywardConfig) -> Self {
        Self {
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &KeywardConfig {
        &self.config
    }

    /// Initialise tracing-based logging on stderr.
    ///
    /// Uses `RUST_LOG` env var if set, otherwise defaults based on verbosity flags.
    pub fn init_logging(&self, verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // Ignore error if a subscriber is already set (e.g. in tests).
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Run the CLI with the given arguments.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        self.init_logging(args.verbose, args.quiet);

        match args.command {
            Some(Command::Version) => {
                println!("keyward {}", self.version);
                Ok(())
            }
            Some(Command::Config(config_cmd)) => {
                config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command)
            }
            Some(command) => {
                let path = self.config.journal_path(args.journal.as_deref())?;
                let store = self.open_store(&path).await?;
                let output = execute(&store, command).await?;
                println!("{}", to_pretty_json(&output)?);
                Ok(())
            }
            None => {
                println!("keyward {} (use --help for usage)", self.version);
                Ok(())
            }
        }
    }

    /// Replay the journal at `path` into a store that commits back to it.
    pub async fn open_store(&self, path: &Path) -> Result<AuthorizationStore> {
        let operations = FileJournal::load(path).await?;
        let journal = FileJournal::open(path).await?;
        let store = AuthorizationStore::with_config(Arc::new(journal), self.config.store.clone())?;
        let count = store.replay(&operations).await;
        debug!("Opened journal {} ({count} records)", path.display());
        Ok(store)
    }
}

// ============================================================================
// Command execution
// ============================================================================

/// Run one store command and return its JSON result.
pub async fn execute(store: &AuthorizationStore, command: Command) -> Result<Value> {
    match command {
        Command::CreateUser {
            owner,
            access_key,
            secret_key,
        } => {
            let record = match (access_key, secret_key) {
                (Some(ak), Some(sk)) => store.create_credential_with_keys(&owner, &ak, &sk).await?,
                (None, None) => store.create_generated_credential(&owner).await?,
                _ => {
                    return Err(Error::invalid_key(
                        "--access-key and --secret-key must be given together",
                    ));
                }
            };
            info!("Created credential for {owner}");
            to_value(&record)
        }
        Command::DeleteUser { owner } => {
            store.delete_credential(&owner).await?;
            Ok(json!({ "deleted": owner }))
        }
        Command::Info { owner, access_key } => {
            let record = match (owner, access_key) {
                (Some(owner), _) => store.get_by_owner(&owner)?,
                (None, Some(ak)) => store.get_by_access_key(&ak)?,
                (None, None) => return Err(Error::invalid_key("pass --owner or --access-key")),
            };
            to_value(&record)
        }
        Command::Grant(policy) => {
            let delta = policy.grant_set()?;
            let record = store.grant_policy(&policy.access_key, &delta).await?;
            policy_summary(&record)
        }
        Command::Revoke(policy) => {
            let delta = policy.grant_set()?;
            let record = store.revoke_policy(&policy.access_key, &delta).await?;
            policy_summary(&record)
        }
        Command::Transfer { volume, from, to } => {
            let record = store.transfer_volume_ownership(&volume, &from, &to).await?;
            policy_summary(&record)
        }
        Command::PurgeVolume { volume } => {
            store.purge_volume(&volume).await?;
            Ok(json!({ "purged": volume }))
        }
        Command::Volume { volume } => {
            let grants = store.volume_grants(&volume)?;
            Ok(json!({ "volume": volume, "grants": to_value(&grants)? }))
        }
        Command::Dump { show_secrets } => {
            let snapshot = store.snapshot().await;
            if show_secrets {
                to_value(&snapshot)
            } else {
                to_value(&snapshot.redacted())
            }
        }
        Command::Verify => {
            let problems = store.check_consistency().await;
            Ok(json!({ "consistent": problems.is_empty(), "problems": problems }))
        }
        Command::Version | Command::Config(_) => Err(Error::config(
            "version and config commands do not operate on the store",
        )),
    }
}

/// A credential's policy without its secret key.
fn policy_summary(record: &CredentialRecord) -> Result<Value> {
    Ok(json!({
        "owner": record.owner,
        "access_key": record.access_key,
        "grants": to_value(&record.grants)?,
    }))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::serialization(e.to_string()))
}

fn to_pretty_json(value: &Value) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::serialization(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
