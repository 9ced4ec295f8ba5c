//! CLI argument parsing and command definitions.

use clap::{ArgGroup, Args, Parser, Subcommand};
use keyward_core::{Error, GrantSet, Result};

// ============================================================================
// CLI argument types
// ============================================================================

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "keyward", author, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "KEYWARD_CONFIG")]
    pub config: Option<String>,

    /// Path to the journal file, overriding the configuration.
    #[arg(short, long)]
    pub journal: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Store commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Issue a credential for an owner.
    CreateUser {
        /// Owning account.
        owner: String,

        /// Caller-supplied access key (requires --secret-key).
        #[arg(long, requires = "secret_key")]
        access_key: Option<String>,

        /// Caller-supplied secret key (requires --access-key).
        #[arg(long, requires = "access_key")]
        secret_key: Option<String>,
    },

    /// Revoke an owner's credential and every grant it holds.
    DeleteUser {
        /// Owning account.
        owner: String,
    },

    /// Show one credential.
    #[command(group(ArgGroup::new("lookup").required(true).args(["owner", "access_key"])))]
    Info {
        /// Look up by owner.
        #[arg(long)]
        owner: Option<String>,

        /// Look up by access key.
        #[arg(long)]
        access_key: Option<String>,
    },

    /// Add grants to a credential.
    Grant(PolicyArgs),

    /// Remove grants from a credential.
    Revoke(PolicyArgs),

    /// Move ownership of a volume between credentials.
    Transfer {
        /// Volume name.
        volume: String,

        /// Access key currently owning the volume.
        from: String,

        /// Access key receiving ownership.
        to: String,
    },

    /// Revoke every grant on a volume and stop tracking it.
    PurgeVolume {
        /// Volume name.
        volume: String,
    },

    /// List the grants on a volume.
    Volume {
        /// Volume name.
        volume: String,
    },

    /// Print the full store state.
    Dump {
        /// Include secret keys.
        #[arg(long)]
        show_secrets: bool,
    },

    /// Cross-check the indices and report inconsistencies.
    Verify,

    /// Print version information.
    Version,

    /// Configuration operations.
    Config(ConfigCommand),
}

/// A grant delta given on the command line.
#[derive(Args, Debug, Clone)]
pub struct PolicyArgs {
    /// Access key of the credential.
    pub access_key: String,

    /// Volume to own outright (repeatable).
    #[arg(long = "own", value_name = "VOLUME")]
    pub own: Vec<String>,

    /// Scoped action on a volume, as VOLUME:ACTION (repeatable).
    #[arg(long = "allow", value_name = "VOLUME:ACTION")]
    pub allow: Vec<String>,
}

impl PolicyArgs {
    /// The grant set these flags describe.
    pub fn grant_set(&self) -> Result<GrantSet> {
        if self.own.is_empty() && self.allow.is_empty() {
            return Err(Error::invalid_policy(
                "nothing to change; pass --own or --allow",
            ));
        }
        let mut grants = GrantSet::new();
        for volume in &self.own {
            grants = grants.with_owned(volume.as_str());
        }
        for pair in &self.allow {
            let (volume, action) = pair.split_once(':').ok_or_else(|| {
                Error::invalid_policy(format!("expected VOLUME:ACTION, got '{pair}'"))
            })?;
            grants = grants.with_action(volume, action);
        }
        grants.validate()?;
        Ok(grants)
    }
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Print the effective configuration as TOML.
    Show,

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_args_default() {
        let args = CliArgs::parse_from(["keyward"]);
        assert!(args.config.is_none());
        assert!(args.journal.is_none());
        assert!(!args.verbose);
        assert!(!args.quiet);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_args_global_flags() {
        let args = CliArgs::parse_from([
            "keyward",
            "--journal",
            "/tmp/k.journal",
            "--verbose",
            "verify",
        ]);
        assert_eq!(args.journal.as_deref(), Some("/tmp/k.journal"));
        assert!(args.verbose);
        assert!(matches!(args.command, Some(Command::Verify)));
    }

    #[test]
    fn test_create_user_with_keys() {
        let args = CliArgs::parse_from([
            "keyward",
            "create-user",
            "alice",
            "--access-key",
            "AK1",
            "--secret-key",
            "SK1",
        ]);
        match args.command {
            Some(Command::CreateUser {
                owner,
                access_key,
                secret_key,
            }) => {
                assert_eq!(owner, "alice");
                assert_eq!(access_key.as_deref(), Some("AK1"));
                assert_eq!(secret_key.as_deref(), Some("SK1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_create_user_access_key_requires_secret() {
        let result =
            CliArgs::try_parse_from(["keyward", "create-user", "alice", "--access-key", "AK1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_info_requires_a_lookup() {
        assert!(CliArgs::try_parse_from(["keyward", "info"]).is_err());
        let args = CliArgs::parse_from(["keyward", "info", "--owner", "alice"]);
        assert!(matches!(
            args.command,
            Some(Command::Info { owner: Some(_), access_key: None })
        ));
    }

    #[test]
    fn test_grant_flags_build_grant_set() {
        let args = CliArgs::parse_from([
            "keyward", "grant", "AK1", "--own", "vol1", "--allow", "vol2:read", "--allow",
            "vol2:write",
        ]);
        let Some(Command::Grant(policy)) = args.command else {
            panic!("expected grant");
        };
        let grants = policy.grant_set().unwrap();
        assert!(grants.owns("vol1"));
        assert!(grants.allows("vol2", "read"));
        assert!(grants.allows("vol2", "write"));
    }

    #[test]
    fn test_policy_args_rejects_malformed_allow() {
        let policy = PolicyArgs {
            access_key: "AK1".into(),
            own: vec![],
            allow: vec!["vol2-read".into()],
        };
        assert!(matches!(policy.grant_set(), Err(Error::InvalidPolicy(_))));
    }

    #[test]
    fn test_policy_args_rejects_empty_delta() {
        let policy = PolicyArgs {
            access_key: "AK1".into(),
            own: vec![],
            allow: vec![],
        };
        assert!(policy.grant_set().is_err());
    }

    #[test]
    fn test_config_subcommands() {
        let args = CliArgs::parse_from(["keyward", "config", "init", "--force"]);
        let Some(Command::Config(cmd)) = args.command else {
            panic!("expected config");
        };
        assert!(matches!(
            cmd.command,
            ConfigAction::Init {
                file: None,
                force: true
            }
        ));
    }
}
