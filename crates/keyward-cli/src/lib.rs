//! CLI for the Keyward authorization store.
//!
//! # Key Abstractions
//!
//! - [`KeywardCli`]: loads configuration, initialises logging, and runs one
//!   command against a journal-backed store
//! - [`CliArgs`]: clap argument definitions
//! - [`KeywardConfig`]: confyg-backed configuration

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;

pub use app::{KeywardCli, execute};
pub use cli::{CliArgs, Command, ConfigAction, PolicyArgs};
pub use config::{JournalConfig, KeywardConfig};
