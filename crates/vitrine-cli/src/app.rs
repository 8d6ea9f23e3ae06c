//! Vitrine CLI application.
//!
//! Owns the loaded configuration and dispatches parsed commands to their
//! handlers.

use crate::cli::{CliArgs, Command};
use crate::config::VitrineConfig;
use crate::config_handlers;
use crate::handlers::{self, SearchOptions};
use tracing_subscriber::EnvFilter;
use vitrine_core::Result;

// ============================================================================
// VitrineApp
// ============================================================================

/// The CLI application.
pub struct VitrineApp {
    name: String,
    config: VitrineConfig,
    version: String,
}

impl VitrineApp {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(name: impl Into<String>, args: &CliArgs) -> Result<Self> {
        let config = VitrineConfig::load(args.config.as_deref())?;
        Ok(Self::new(name, config))
    }

    /// Create an application with an already-loaded configuration.
    pub fn new(name: impl Into<String>, config: VitrineConfig) -> Self {
        Self {
            name: name.into(),
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// The loaded configuration.
    pub fn config(&self) -> &VitrineConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` env var if set, otherwise defaults based on verbosity flags.
    /// `log` records from the library crates are captured as well.
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

        // A subscriber may already be set (e.g. in tests).
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Run the CLI with the given arguments.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        self.init_logging(args.verbose, args.quiet);

        match args.command {
            Some(Command::Ingest { file, concurrency }) => {
                handlers::handle_ingest(&self.config, &file, concurrency).await
            }
            Some(Command::Search {
                text,
                image,
                limit,
                allow_degraded,
                json,
            }) => {
                let options = SearchOptions {
                    text,
                    image,
                    limit,
                    allow_degraded,
                };
                handlers::handle_search(&self.config, options, json).await
            }
            Some(Command::Get { id }) => handlers::handle_get(&self.config, &id).await,
            Some(Command::Delete { id }) => handlers::handle_delete(&self.config, &id).await,
            Some(Command::Version) => {
                println!("{} {}", self.name, self.version);
                Ok(())
            }
            Some(Command::Config(config_cmd)) => {
                config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command)
            }
            None => {
                println!("{} {}: use --help for usage", self.name, self.version);
                Ok(())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
