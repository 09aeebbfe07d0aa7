//! Key generator module for the sharded key generation system.
//!
//! This module defines the capability every key generation strategy must
//! provide, the built-in strategies, and the factory that turns a type name
//! plus properties into a ready-to-use generator. Each shard mints keys
//! locally through these generators, without talking to other shards.

use keygen_registry::{Extension, ExtensionDescriptor, RegistryError};
use keygen_types::{ConfigSchema, GeneratedKey, ImplementationRegistry, Properties, ValidationError};
use thiserror::Error;

mod configured;
mod factory;
pub mod time;

pub use factory::KeyGeneratorFactory;

/// Re-export implementations
pub mod implementations {
	pub mod snowflake;
	pub mod uuid;
}

/// Errors that can occur while selecting, configuring or using a key generator.
#[derive(Debug, Error)]
pub enum KeyGeneratorError {
	/// No registered implementation answers to the requested type name.
	#[error("Invalid key generator type.")]
	InvalidType {
		/// The type name the caller asked for.
		requested: String,
	},
	/// The implementation rejected the supplied properties.
	#[error("Invalid properties: {0}")]
	InvalidProperties(#[from] ValidationError),
	/// Properties were applied twice, or after the first key was generated.
	#[error("Key generator '{0}' is already configured")]
	AlreadyConfigured(&'static str),
	/// The clock went backwards further than the configured tolerance.
	#[error("Clock is moving backwards, last time is {last} milliseconds, current time is {current} milliseconds")]
	ClockMovedBackwards { last: u64, current: u64 },
	/// Internal failure inside an implementation.
	#[error("Internal error: {0}")]
	Internal(String),
	/// The extension registry could not enumerate implementations.
	#[error(transparent)]
	Registry(#[from] RegistryError),
}

/// Trait defining the interface for key generation strategies.
///
/// This trait must be implemented by any strategy that wants to be selectable
/// by type name. Implementations are constructed fresh for every logical
/// column, configured at most once, then asked for keys.
pub trait KeyGeneratorInterface: Send + Sync {
	/// Stable, user-facing type name (for example "SNOWFLAKE").
	fn type_name(&self) -> &'static str;

	/// Returns the property schema for this implementation.
	///
	/// Callers can use it to check properties before building a generator.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Validates and applies properties.
	///
	/// May succeed at most once, and only before the first key is generated.
	/// Any later call fails with [`KeyGeneratorError::AlreadyConfigured`] and
	/// leaves the generator unchanged.
	fn configure(&mut self, properties: &Properties) -> Result<(), KeyGeneratorError>;

	/// Properties this generator was configured with, if any.
	fn properties(&self) -> Option<&Properties>;

	/// Generates the next key.
	///
	/// Generating before `configure` locks the generator to its defaults.
	fn generate_key(&self) -> Result<GeneratedKey, KeyGeneratorError>;
}

/// Type alias for key generator constructors.
///
/// Every implementation provides one so the registry can mint brand-new,
/// unconfigured instances on demand.
pub type KeyGeneratorConstructor = fn() -> Box<dyn KeyGeneratorInterface>;

/// Registry trait for key generator implementations.
///
/// This trait extends the base ImplementationRegistry to specify that
/// key generator implementations must provide a KeyGeneratorConstructor.
pub trait KeyGeneratorRegistry: ImplementationRegistry<Factory = KeyGeneratorConstructor> {}

/// Get all built-in key generator implementations.
///
/// Descriptors come back in declaration order. The order is the discovery
/// order, so on a name clash the earlier entry wins.
pub fn get_all_implementations() -> Vec<ExtensionDescriptor<dyn KeyGeneratorInterface>> {
	use implementations::{snowflake, uuid};

	vec![
		descriptor::<snowflake::Registry>(),
		descriptor::<uuid::Registry>(),
	]
}

fn descriptor<R: KeyGeneratorRegistry>() -> ExtensionDescriptor<dyn KeyGeneratorInterface> {
	ExtensionDescriptor::from_registry::<R>()
}

/// Capability marker for key generators in the extension registry.
pub struct KeyGenerators;

impl Extension for KeyGenerators {
	const CAPABILITY: &'static str = "key-generator";
	type Instance = dyn KeyGeneratorInterface;

	fn discover() -> Vec<ExtensionDescriptor<dyn KeyGeneratorInterface>> {
		get_all_implementations()
	}
}
