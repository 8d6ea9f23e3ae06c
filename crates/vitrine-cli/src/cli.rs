//! CLI argument parsing and command definitions.
//!
//! Global flags (configuration, verbosity) plus the catalog commands:
//! ingest, search, get, delete, version, and config.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// ============================================================================
// CLI argument types
// ============================================================================

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "vitrine", author, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "VITRINE_CONFIG")]
    pub config: Option<String>,

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

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed and store products from a JSON Lines file.
    Ingest {
        /// File with one product object per line.
        file: PathBuf,

        /// Products embedded at once (defaults to `ingest.concurrency`).
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Search the catalog by text, image, or both.
    Search {
        /// Natural-language query.
        #[arg(short, long)]
        text: Option<String>,

        /// Example image file.
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Maximum number of results.
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Continue with one modality if the other fails.
        #[arg(long)]
        allow_degraded: bool,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show a stored record.
    Get {
        /// Record id.
        id: String,
    },

    /// Delete a stored record.
    Delete {
        /// Record id.
        id: String,
    },

    /// Print version information.
    Version,

    /// Configuration operations.
    Config(ConfigCommand),
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

    /// Get a configuration value by dotted key.
    Get {
        /// Dotted key (e.g., "vector.rrf_k_constant").
        key: String,
    },

    /// Set a configuration value by dotted key.
    Set {
        /// Dotted key (e.g., "vector.rrf_k_constant").
        key: String,

        /// Value to set.
        value: String,
    },

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },

    /// Export configuration as environment variables.
    Export {
        /// Format as Docker --env flags.
        #[arg(long)]
        docker_env: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_args_default() {
        let args = CliArgs::parse_from(["vitrine"]);
        assert!(!args.verbose);
        assert!(!args.quiet);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_args_flags() {
        let args = CliArgs::parse_from(["vitrine", "--verbose", "--config", "/etc/vitrine.toml"]);
        assert!(args.verbose);
        assert_eq!(args.config.as_deref(), Some("/etc/vitrine.toml"));
    }

    #[test]
    fn test_ingest_command() {
        let args = CliArgs::parse_from(["vitrine", "ingest", "products.jsonl", "--concurrency", "4"]);
        match args.command {
            Some(Command::Ingest { file, concurrency }) => {
                assert_eq!(file, PathBuf::from("products.jsonl"));
                assert_eq!(concurrency, Some(4));
            }
            _ => panic!("Expected Ingest command"),
        }
    }

    #[test]
    fn test_search_command_defaults() {
        let args = CliArgs::parse_from(["vitrine", "search", "--text", "oak chair"]);
        match args.command {
            Some(Command::Search {
                text,
                image,
                limit,
                allow_degraded,
                json,
            }) => {
                assert_eq!(text.as_deref(), Some("oak chair"));
                assert!(image.is_none());
                assert_eq!(limit, 10);
                assert!(!allow_degraded);
                assert!(!json);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_search_command_both_modalities() {
        let args = CliArgs::parse_from([
            "vitrine",
            "search",
            "-t",
            "oak chair",
            "-i",
            "chair.jpg",
            "-l",
            "3",
            "--allow-degraded",
            "--json",
        ]);
        match args.command {
            Some(Command::Search {
                image,
                limit,
                allow_degraded,
                json,
                ..
            }) => {
                assert_eq!(image, Some(PathBuf::from("chair.jpg")));
                assert_eq!(limit, 3);
                assert!(allow_degraded);
                assert!(json);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_get_and_delete_commands() {
        let args = CliArgs::parse_from(["vitrine", "get", "sku-1"]);
        assert!(matches!(args.command, Some(Command::Get { id }) if id == "sku-1"));

        let args = CliArgs::parse_from(["vitrine", "delete", "sku-1"]);
        assert!(matches!(args.command, Some(Command::Delete { id }) if id == "sku-1"));
    }

    #[test]
    fn test_version_command() {
        let args = CliArgs::parse_from(["vitrine", "version"]);
        assert!(matches!(args.command, Some(Command::Version)));
    }

    // ------------------------------------------------------------------------
    // Config command tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_config_set_command() {
        let args = CliArgs::parse_from(["vitrine", "config", "set", "vector.rrf_k_constant", "30"]);
        match args.command {
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Set { key, value },
            })) => {
                assert_eq!(key, "vector.rrf_k_constant");
                assert_eq!(value, "30");
            }
            _ => panic!("Expected Config Set command"),
        }
    }

    #[test]
    fn test_config_init_force() {
        let args = CliArgs::parse_from(["vitrine", "config", "init", "--force"]);
        match args.command {
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Init { file, force },
            })) => {
                assert!(file.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_config_export_docker_env() {
        let args = CliArgs::parse_from(["vitrine", "config", "export", "--docker-env"]);
        assert!(matches!(
            args.command,
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Export { docker_env: true }
            }))
        ));
    }
}
