//! Builds the per-table key generators declared in the configuration.
//!
//! Every table gets its own freshly created and configured generator, so
//! no two tables ever share sequence state.

use keygen_config::Config;
use keygen_generator::{KeyGeneratorError, KeyGeneratorFactory, KeyGeneratorInterface};
use keygen_types::GeneratedKey;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur while building table key generators.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Failed to create key generator for table '{table}': {source}")]
	KeyGenerator {
		table: String,
		#[source]
		source: KeyGeneratorError,
	},
}

/// A configured generator bound to the column it fills.
pub struct TableKeyGenerator {
	pub column: String,
	generator: Box<dyn KeyGeneratorInterface>,
}

impl TableKeyGenerator {
	/// Type name of the underlying generator.
	pub fn type_name(&self) -> &'static str {
		self.generator.type_name()
	}

	/// Generates `count` keys in order.
	pub fn generate_keys(&self, count: usize) -> Result<Vec<GeneratedKey>, KeyGeneratorError> {
		(0..count).map(|_| self.generator.generate_key()).collect()
	}
}

/// Creates one generator per configured table, keyed by table name.
///
/// Tables without a key generator of their own use `default_key_generator`;
/// tables with neither are skipped.
pub fn build_table_generators(
	config: &Config,
	factory: &KeyGeneratorFactory,
) -> Result<BTreeMap<String, TableKeyGenerator>, BuilderError> {
	let mut generators = BTreeMap::new();

	for (table, key_generator) in config.table_key_generators() {
		match factory.new_instance(&key_generator.generator_type, &key_generator.props) {
			Ok(generator) => {
				tracing::info!(
					component = "key_generator",
					table = %table,
					implementation = %generator.type_name(),
					"Loaded"
				);
				generators.insert(
					table.to_string(),
					TableKeyGenerator {
						column: key_generator.column.clone(),
						generator,
					},
				);
			},
			Err(e) => {
				tracing::error!(
					component = "key_generator",
					table = %table,
					implementation = %key_generator.generator_type,
					error = %e,
					"Failed to create key generator"
				);
				return Err(BuilderError::KeyGenerator {
					table: table.to_string(),
					source: e,
				});
			},
		}
	}

	Ok(generators)
}

#[cfg(test)]
mod tests {
	use super::*;
	use keygen_generator::implementations::snowflake::SnowflakeKeyParts;
	use keygen_registry::ExtensionRegistry;
	use std::sync::Arc;

	fn isolated_factory() -> KeyGeneratorFactory {
		KeyGeneratorFactory::new(Arc::new(ExtensionRegistry::new()))
	}

	#[test]
	fn test_builds_one_generator_per_table() {
		let config: Config = r#"
[service]
id = "shard-0"

[default_key_generator]
column = "id"
type = "uuid"

[tables.t_user]

[tables.t_order.key_generator]
column = "order_id"
type = "snowflake"
props = { worker-id = 7 }
"#
		.parse()
		.unwrap();

		let generators = build_table_generators(&config, &isolated_factory()).unwrap();
		assert_eq!(generators.len(), 2);

		let order = &generators["t_order"];
		assert_eq!(order.column, "order_id");
		assert_eq!(order.type_name(), "SNOWFLAKE");
		let keys = order.generate_keys(3).unwrap();
		assert_eq!(keys.len(), 3);
		for key in &keys {
			let parts = SnowflakeKeyParts::parse(key.as_u64().unwrap());
			assert_eq!(parts.worker_id, 7);
		}
		assert!(keys.windows(2).all(|w| w[0].as_u64() < w[1].as_u64()));

		let user = &generators["t_user"];
		assert_eq!(user.column, "id");
		assert_eq!(user.type_name(), "UUID");
	}

	#[test]
	fn test_unknown_type_names_the_table() {
		let config: Config = r#"
[service]
id = "shard-0"

[tables.t_order.key_generator]
column = "order_id"
type = "sequence"
"#
		.parse()
		.unwrap();

		let err = build_table_generators(&config, &isolated_factory())
			.err()
			.unwrap();
		assert!(matches!(
			err,
			BuilderError::KeyGenerator {
				ref table,
				source: KeyGeneratorError::InvalidType { .. },
			} if table == "t_order"
		));
		assert!(err.to_string().contains("Invalid key generator type."));
	}

	#[test]
	fn test_invalid_properties_fail_the_build() {
		let config: Config = r#"
[service]
id = "shard-0"

[tables.t_order.key_generator]
column = "order_id"
type = "SNOWFLAKE"
props = { worker-id = 4096 }
"#
		.parse()
		.unwrap();

		let result = build_table_generators(&config, &isolated_factory());
		assert!(matches!(
			result,
			Err(BuilderError::KeyGenerator {
				source: KeyGeneratorError::InvalidProperties(_),
				..
			})
		));
	}

	#[test]
	fn test_tables_do_not_share_state() {
		let config: Config = r#"
[service]
id = "shard-0"

[default_key_generator]
column = "id"
type = "SNOWFLAKE"

[tables.a]
[tables.b]
"#
		.parse()
		.unwrap();

		let generators = build_table_generators(&config, &isolated_factory()).unwrap();
		let a = generators["a"].generate_keys(1).unwrap()[0].as_u64().unwrap();
		let b = generators["b"].generate_keys(1).unwrap()[0].as_u64().unwrap();

		// A fresh generator starts its sequence from the vibration offset.
		assert_eq!(SnowflakeKeyParts::parse(a).sequence, 0);
		assert_eq!(SnowflakeKeyParts::parse(b).sequence, 0);
	}

	#[test]
	fn test_empty_config_builds_nothing() {
		let config: Config = "[service]\nid = \"shard-0\"".parse().unwrap();
		let generators = build_table_generators(&config, &isolated_factory()).unwrap();
		assert!(generators.is_empty());
	}
}
