//! Configuration module for the key generation service.
//!
//! This module provides structures and utilities for declaring which key
//! generator each logical table uses. Configuration is read from TOML files,
//! environment variables are substituted before parsing, and the result is
//! validated before it is handed to the rest of the system.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Included files may include further files, relative to their own directory
//! - `[tables.*]` entries are merged across files, each table defined once
//! - Every other top-level section must be unique across all files

mod loader;

use keygen_types::Properties;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

pub use loader::ConfigLoader;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the key generation service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this service instance.
	pub service: ServiceConfig,
	/// Key generator used by tables that do not declare their own.
	#[serde(default)]
	pub default_key_generator: Option<KeyGeneratorConfig>,
	/// Logical tables, keyed by table name.
	#[serde(default)]
	pub tables: BTreeMap<String, TableConfig>,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this instance, usually the shard name.
	pub id: String,
}

/// Configuration for one logical table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TableConfig {
	/// Key generator for the table's generated column.
	#[serde(default)]
	pub key_generator: Option<KeyGeneratorConfig>,
}

/// Declares the key generator for a column.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KeyGeneratorConfig {
	/// Column whose values are generated.
	pub column: String,
	/// Key generator type name, matched case-insensitively.
	#[serde(rename = "type")]
	pub generator_type: String,
	/// Properties handed to the generator. Each generator reads its own keys.
	#[serde(default)]
	pub props: Properties,
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	static ENV_VAR: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = ENV_VAR
		.get_or_init(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}"))
		.as_ref()
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following include directives.
	///
	/// Each table, and each other top-level section, must be defined in
	/// exactly one of the configuration files.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = ConfigLoader::new(base_dir);
		let file_name = path
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path.display())))?;
		loader.load_config(file_name).await
	}

	/// Builds a configuration from an already substituted TOML table.
	pub(crate) fn from_table(table: toml::Table) -> Result<Self, ConfigError> {
		let config = toml::Value::Table(table).try_into::<Config>()?;
		config.validate()?;
		Ok(config)
	}

	/// Returns the key generator a table uses, falling back to the default.
	pub fn key_generator_for(&self, table: &str) -> Option<&KeyGeneratorConfig> {
		self.tables
			.get(table)
			.and_then(|t| t.key_generator.as_ref())
			.or(self.default_key_generator.as_ref())
	}

	/// Iterates over every table that ends up with a key generator.
	pub fn table_key_generators(&self) -> impl Iterator<Item = (&str, &KeyGeneratorConfig)> {
		self.tables
			.keys()
			.filter_map(|name| self.key_generator_for(name).map(|kg| (name.as_str(), kg)))
	}

	/// Validates the configuration.
	///
	/// - The service id must not be empty
	/// - Every key generator must name a column and a type
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if let Some(default) = &self.default_key_generator {
			validate_key_generator("default_key_generator", default)?;
		}

		for (table, config) in &self.tables {
			if table.trim().is_empty() {
				return Err(ConfigError::Validation("Table name cannot be empty".into()));
			}
			if let Some(key_generator) = &config.key_generator {
				validate_key_generator(&format!("tables.{}.key_generator", table), key_generator)?;
			}
		}

		Ok(())
	}
}

fn validate_key_generator(section: &str, config: &KeyGeneratorConfig) -> Result<(), ConfigError> {
	if config.column.trim().is_empty() {
		return Err(ConfigError::Validation(format!(
			"{}.column cannot be empty",
			section
		)));
	}
	if config.generator_type.trim().is_empty() {
		return Err(ConfigError::Validation(format!(
			"{}.type cannot be empty",
			section
		)));
	}
	Ok(())
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		Config::from_table(toml::from_str(&resolved)?)
	}
}
