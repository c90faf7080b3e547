//! Configuration for the Blokus match client.
//!
//! Settings persist to disk as RON files with CLI overrides via clap.
//! Unknown fields are ignored and missing ones take their defaults.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, GameConfig, NetworkConfig, default_config_dir};
pub use error::ConfigError;
