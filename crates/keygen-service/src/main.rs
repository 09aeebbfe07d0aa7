//! Main entry point for the key generation service.
//!
//! This binary loads a table configuration, builds one key generator per
//! table through the key generator factory, and prints freshly generated
//! keys. It is the quickest way to check that a shard's key generator
//! settings are valid before the shard starts serving writes.

use clap::Parser;
use keygen_config::Config;
use keygen_generator::{KeyGeneratorFactory, KeyGenerators};
use keygen_registry::ExtensionRegistry;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod builder;

use builder::{build_table_generators, BuilderError};

/// Command-line arguments for the key generation service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Only generate keys for this table
	#[arg(short, long)]
	table: Option<String>,

	/// Number of keys to generate per table
	#[arg(short = 'n', long, default_value_t = 1)]
	count: usize,

	/// Print one JSON object per table instead of tab-separated lines
	#[arg(long)]
	json: bool,
}

/// Main entry point for the key generation service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Registers the built-in key generators
/// 5. Builds the table generators and prints keys
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	tracing_subscriber::fmt()
		.with_env_filter(log_filter(&args.log_level))
		.with_thread_ids(true)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	tracing::info!("Started key generation service");

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let registry = initialize_registry()?;
	let factory = KeyGeneratorFactory::new(registry);

	let mut generators = build_table_generators(&config, &factory)?;
	if let Some(table) = &args.table {
		generators.retain(|name, _| name == table);
		if generators.is_empty() {
			return Err(BuilderError::Config(format!(
				"Table '{}' has no key generator configured",
				table
			))
			.into());
		}
	}

	for (table, generator) in &generators {
		let keys = generator.generate_keys(args.count)?;
		if args.json {
			let output = serde_json::json!({
				"table": table,
				"column": generator.column,
				"type": generator.type_name(),
				"keys": keys,
			});
			println!("{}", output);
		} else {
			for key in keys {
				println!("{}.{}\t{}", table, generator.column, key);
			}
		}
	}

	tracing::info!("Stopped key generation service");
	Ok(())
}

/// Log filter from `RUST_LOG`, or `default_directive` when it is unset.
fn log_filter(default_directive: &str) -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Registers the built-in key generators with the process-wide registry.
///
/// Registration is idempotent, so calling this more than once is harmless.
fn initialize_registry() -> Result<std::sync::Arc<ExtensionRegistry>, Box<dyn std::error::Error>> {
	let registry = ExtensionRegistry::global();
	registry.register::<KeyGenerators>()?;

	for name in registry.descriptor_names::<KeyGenerators>()? {
		tracing::debug!(component = "key_generator", implementation = %name, "Registered");
	}

	Ok(registry)
}
