//! NearChat CLI library
//!
//! Components behind the `nearchat` binary: argument parsing, layered
//! configuration, the `serve` and `client` command handlers, and the
//! line-oriented terminal client.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use client::{ChatClient, ClientCommand};
pub use config::{AppConfig, ConfigError, ConfigOverrides};
pub use error::{CliError, Result};
