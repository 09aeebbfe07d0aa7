//! Multi-file configuration loading.
//!
//! A configuration file may list other files under `include`. Included files
//! can include further files; paths are relative to the including file.
//! Tables are merged across files so each `[tables.<name>]` can live in its
//! own file. Environment variables are substituted exactly once per file,
//! before the file is parsed.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const INCLUDE_KEY: &str = "include";
const TABLES_KEY: &str = "tables";

/// Loads a configuration file together with everything it includes.
pub struct ConfigLoader {
	/// Directory the entry file is resolved against
	base_path: PathBuf,
	/// Canonical paths already read, so include cycles are caught
	loaded_files: HashSet<PathBuf>,
	/// File each section came from, e.g. "service" or "tables.t_order"
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	/// Creates a loader resolving the entry file against `base_path`.
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Loads `config_path` and its includes into one validated [`Config`].
	///
	/// # Errors
	///
	/// - [`ConfigError::Io`] if a file is missing or unreadable
	/// - [`ConfigError::Parse`] if a file is not valid TOML
	/// - [`ConfigError::Validation`] for include cycles, sections or tables
	///   defined in more than one file, or an invalid merged configuration
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let entry = resolve_path(&self.base_path, config_path.as_ref())?;

		let mut merged = toml::Table::new();
		let mut pending = vec![entry];
		while let Some(path) = pending.pop() {
			let mut table = self.load_file(&path).await?;

			let dir = path.parent().unwrap_or_else(|| Path::new("."));
			let includes = take_includes(&mut table, &path)?;
			// Reversed so includes are visited in the order they are listed
			for include in includes.iter().rev() {
				pending.push(resolve_path(dir, include)?);
			}

			self.merge(&path, table, &mut merged)?;
		}

		Config::from_table(merged)
	}

	/// Reads one file, substitutes environment variables and parses it.
	async fn load_file(&mut self, path: &Path) -> Result<toml::Table, ConfigError> {
		let canonical_path = tokio::fs::canonicalize(path).await?;
		if !self.loaded_files.insert(canonical_path.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical_path.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		let resolved = resolve_env_vars(&content)?;
		toml::from_str(&resolved).map_err(|e| {
			ConfigError::Parse(format!("{}: {}", path.display(), e.message()))
		})
	}

	/// Moves the sections of `table` into `merged`.
	///
	/// Entries under `tables` are merged one table at a time; any other
	/// section, or a table seen before, is a duplicate.
	fn merge(
		&mut self,
		source: &Path,
		table: toml::Table,
		merged: &mut toml::Table,
	) -> Result<(), ConfigError> {
		for (key, value) in table {
			if key != TABLES_KEY {
				self.claim(key.clone(), source)?;
				merged.insert(key, value);
				continue;
			}

			let toml::Value::Table(tables) = value else {
				return Err(ConfigError::Validation(format!(
					"'{}' in {} must be a table",
					TABLES_KEY,
					source.display()
				)));
			};

			let target = merged
				.entry(TABLES_KEY)
				.or_insert(toml::Value::Table(toml::Table::new()));
			let toml::Value::Table(target) = target else {
				return Err(ConfigError::Validation(format!(
					"'{}' must be a table",
					TABLES_KEY
				)));
			};
			for (name, table_config) in tables {
				self.claim(format!("{}.{}", TABLES_KEY, name), source)?;
				target.insert(name, table_config);
			}
		}

		Ok(())
	}

	/// Records that `section` is defined in `source`.
	fn claim(&mut self, section: String, source: &Path) -> Result<(), ConfigError> {
		if let Some(existing) = self.section_sources.get(&section) {
			return Err(ConfigError::Validation(format!(
				"Duplicate section '{}' found in {} and {}",
				section,
				existing.display(),
				source.display()
			)));
		}
		self.section_sources.insert(section, source.to_path_buf());
		Ok(())
	}
}

/// Removes the `include` entry from a parsed file and returns its paths.
fn take_includes(table: &mut toml::Table, source: &Path) -> Result<Vec<PathBuf>, ConfigError> {
	let invalid = || {
		ConfigError::Validation(format!(
			"'{}' in {} must be a string or an array of strings",
			INCLUDE_KEY,
			source.display()
		))
	};

	match table.remove(INCLUDE_KEY) {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(paths)) => paths
			.into_iter()
			.map(|path| match path {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(invalid()),
			})
			.collect(),
		Some(_) => Err(invalid()),
	}
}

fn resolve_path(dir: &Path, path: &Path) -> Result<PathBuf, ConfigError> {
	let resolved = if path.is_absolute() {
		path.to_path_buf()
	} else {
		dir.join(path)
	};

	if !resolved.exists() {
		return Err(ConfigError::Io(std::io::Error::new(
			std::io::ErrorKind::NotFound,
			format!("Configuration file not found: {}", resolved.display()),
		)));
	}

	Ok(resolved)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const SERVICE: &str = "[service]\nid = \"shard-0\"\n";

	fn order_table(worker_id: u64) -> String {
		format!(
			"[tables.t_order.key_generator]\ncolumn = \"order_id\"\ntype = \"SNOWFLAKE\"\nprops = {{ worker-id = {} }}\n",
			worker_id
		)
	}

	const USER_TABLE: &str = "[tables.t_user.key_generator]\ncolumn = \"user_id\"\ntype = \"UUID\"\n";

	fn write(dir: &TempDir, name: &str, content: &str) {
		let path = dir.path().join(name);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).unwrap();
		}
		fs::write(path, content).unwrap();
	}

	async fn load(dir: &TempDir, name: &str) -> Result<Config, ConfigError> {
		ConfigLoader::new(dir.path()).load_config(name).await
	}

	#[tokio::test]
	async fn test_single_file_config() {
		let dir = TempDir::new().unwrap();
		write(&dir, "config.toml", &format!("{}{}", SERVICE, order_table(3)));

		let config = load(&dir, "config.toml").await.unwrap();

		assert_eq!(config.service.id, "shard-0");
		let order = config.key_generator_for("t_order").unwrap();
		assert_eq!(order.props.get_u64("worker-id").unwrap(), Some(3));
	}

	#[tokio::test]
	async fn test_tables_merge_across_includes() {
		let dir = TempDir::new().unwrap();
		write(
			&dir,
			"main.toml",
			&format!("include = [\"order.toml\", \"user.toml\"]\n{}", SERVICE),
		);
		write(&dir, "order.toml", &order_table(3));
		write(&dir, "user.toml", USER_TABLE);

		let config = load(&dir, "main.toml").await.unwrap();

		let tables: Vec<_> = config.table_key_generators().map(|(t, _)| t).collect();
		assert_eq!(tables, vec!["t_order", "t_user"]);
	}

	#[tokio::test]
	async fn test_single_string_include() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = \"tables.toml\"\n{}", SERVICE));
		write(&dir, "tables.toml", &order_table(1));

		let config = Config::from_file(dir.path().join("main.toml")).await.unwrap();
		assert_eq!(config.tables.len(), 1);
	}

	#[tokio::test]
	async fn test_nested_includes_are_followed() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = \"tables/all.toml\"\n{}", SERVICE));
		write(&dir, "tables/all.toml", "include = [\"order.toml\", \"user.toml\"]\n");
		write(&dir, "tables/order.toml", &order_table(5));
		write(&dir, "tables/user.toml", USER_TABLE);

		let config = load(&dir, "main.toml").await.unwrap();

		assert_eq!(config.tables.len(), 2);
		let order = config.key_generator_for("t_order").unwrap();
		assert_eq!(order.props.get_u64("worker-id").unwrap(), Some(5));
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = [\"other.toml\"]\n{}", SERVICE));
		write(&dir, "other.toml", "[service]\nid = \"another\"\n");

		let error_msg = load(&dir, "main.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("Duplicate section 'service'"));
	}

	#[tokio::test]
	async fn test_duplicate_table_error() {
		let dir = TempDir::new().unwrap();
		write(
			&dir,
			"main.toml",
			&format!("include = [\"order.toml\"]\n{}{}", SERVICE, order_table(1)),
		);
		write(&dir, "order.toml", &order_table(2));

		let error_msg = load(&dir, "main.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("Duplicate section 'tables.t_order'"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let dir = TempDir::new().unwrap();
		write(&dir, "self.toml", &format!("include = [\"self.toml\"]\n{}", SERVICE));

		let error_msg = load(&dir, "self.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("already loaded"));
	}

	#[tokio::test]
	async fn test_include_cycle_is_rejected() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = \"b.toml\"\n{}", SERVICE));
		write(&dir, "b.toml", &format!("include = \"main.toml\"\n{}", USER_TABLE));

		let error_msg = load(&dir, "main.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("Circular include detected"));
	}

	#[tokio::test]
	async fn test_env_vars_are_substituted_once() {
		std::env::set_var("KEYGEN_TEST_SHARD_REF", "${KEYGEN_TEST_SHARD_UNSET}");
		let content = "[service]\nid = \"${KEYGEN_TEST_SHARD_REF}\"\n";

		let dir = TempDir::new().unwrap();
		write(&dir, "config.toml", content);

		let from_file = load(&dir, "config.toml").await.unwrap();
		let from_str: Config = content.parse().unwrap();
		assert_eq!(from_file.service.id, "${KEYGEN_TEST_SHARD_UNSET}");
		assert_eq!(from_file.service.id, from_str.service.id);

		std::env::remove_var("KEYGEN_TEST_SHARD_REF");
	}

	#[tokio::test]
	async fn test_env_vars_in_included_file() {
		std::env::set_var("KEYGEN_TEST_INCLUDED_WORKER", "9");
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = \"order.toml\"\n{}", SERVICE));
		write(
			&dir,
			"order.toml",
			"[tables.t_order.key_generator]\ncolumn = \"id\"\ntype = \"SNOWFLAKE\"\nprops = { worker-id = \"${KEYGEN_TEST_INCLUDED_WORKER}\" }\n",
		);

		let config = load(&dir, "main.toml").await.unwrap();
		let order = config.key_generator_for("t_order").unwrap();
		assert_eq!(order.props.get_u64("worker-id").unwrap(), Some(9));

		std::env::remove_var("KEYGEN_TEST_INCLUDED_WORKER");
	}

	#[tokio::test]
	async fn test_missing_include_is_reported() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = [\"absent.toml\"]\n{}", SERVICE));

		let result = load(&dir, "main.toml").await;
		assert!(matches!(result, Err(ConfigError::Io(_))));
	}

	#[tokio::test]
	async fn test_non_string_include_is_rejected() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = [1]\n{}", SERVICE));

		let error_msg = load(&dir, "main.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("must be a string or an array of strings"));
	}

	#[tokio::test]
	async fn test_merged_config_is_validated() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = \"bad.toml\"\n{}", SERVICE));
		write(&dir, "bad.toml", "[tables.t_bad.key_generator]\ncolumn = \"\"\ntype = \"UUID\"\n");

		let result = load(&dir, "main.toml").await;
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}
}
