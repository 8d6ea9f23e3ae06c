//! Configuration for the Vitrine CLI.
//!
//! Provides the [`VitrineConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `VITRINE_CONFIG` environment variable
//! 3. XDG default: `~/.config/vitrine/config.toml`
//! 4. Built-in defaults
//!
//! `VITRINE_*` environment variables are layered over the file.

use confyg::{Confygery, env};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vitrine_core::{Error, Result};
use vitrine_vector::VectorConfig;

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for the Vitrine CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitrineConfig {
    /// Project name, used in log and version output.
    pub project_name: String,

    /// Storage and search settings.
    pub vector: VectorConfig,

    /// Embedding provider settings.
    pub provider: ProviderConfig,

    /// Batch ingestion settings.
    pub ingest: IngestConfig,
}

/// Which embedding provider to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Deterministic offline vectors.
    #[default]
    Mock,
    /// Remote inference endpoint (requires the `provider-http` feature).
    Http,
}

/// Embedding provider configuration.
///
/// Dimensions are taken from `vector.text_dimension` and
/// `vector.image_dimension`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider kind.
    pub kind: ProviderKind,

    /// Text embedding endpoint (http provider).
    pub text_url: Option<String>,

    /// Image embedding endpoint (http provider).
    pub image_url: Option<String>,

    /// Bearer token (http provider).
    pub api_key: Option<String>,

    /// Per-request timeout in milliseconds (http provider).
    pub timeout_ms: u64,
}

/// Batch ingestion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Products embedded at once.
    pub concurrency: usize,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for VitrineConfig {
    fn default() -> Self {
        Self {
            project_name: "vitrine".to_string(),
            vector: VectorConfig::default(),
            provider: ProviderConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Mock,
            text_url: None,
            image_url: None,
            api_key: None,
            timeout_ms: 30_000,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl VitrineConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path) {
            if path.exists() {
                builder
                    .add_file(&path.to_string_lossy())
                    .map_err(|e| Error::config(format!("config file: {e}")))?;
            }
        }

        let mut env_opts = env::Options::with_top_level("VITRINE");
        env_opts.add_section("vector");
        env_opts.add_section("provider");
        env_opts.add_section("ingest");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        config.vector.validate()?;
        Ok(config)
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("VITRINE_CONFIG") {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("vitrine").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Flatten this config into environment variable pairs with `VITRINE_` prefix.
    pub fn to_env_vars(&self) -> Result<Vec<(String, String)>> {
        let value: toml::Value =
            toml::Value::try_from(self).map_err(|e| Error::config(e.to_string()))?;
        let mut vars = Vec::new();
        flatten_toml_value(&value, "VITRINE", &mut vars);
        Ok(vars)
    }
}

// ============================================================================
// Helper: flatten TOML to env vars
// ============================================================================

fn flatten_toml_value(value: &toml::Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, val) in table {
                let env_key = format!("{}_{}", prefix, key.to_uppercase());
                flatten_toml_value(val, &env_key, out);
            }
        }
        toml::Value::Array(arr) => {
            if let Ok(json) = serde_json::to_string(arr) {
                out.push((prefix.to_string(), json));
            }
        }
        toml::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        toml::Value::Integer(i) => out.push((prefix.to_string(), i.to_string())),
        toml::Value::Float(f) => out.push((prefix.to_string(), f.to_string())),
        toml::Value::Boolean(b) => out.push((prefix.to_string(), b.to_string())),
        toml::Value::Datetime(dt) => out.push((prefix.to_string(), dt.to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================
