//! Command-line interface for Vitrine product search.
//!
//! # Key Abstractions
//!
//! - [`CliArgs`]: parsed global flags and subcommand
//! - [`VitrineConfig`]: layered file/environment configuration
//! - [`VitrineApp`]: loads configuration and dispatches commands

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;
pub mod handlers;

pub use app::VitrineApp;
pub use cli::{CliArgs, Command, ConfigAction, ConfigCommand};
pub use config::{IngestConfig, ProviderConfig, ProviderKind, VitrineConfig};
