//! Random UUID key generator.
//!
//! Produces version 4 UUIDs rendered as 32 lowercase hex characters without
//! hyphens. No coordination or configuration is needed; any properties are
//! accepted and ignored.

use crate::configured::ConfiguredSettings;
use crate::{KeyGeneratorError, KeyGeneratorInterface};
use keygen_types::{ConfigSchema, GeneratedKey, Properties, Schema, ValidationError};

/// UUID key generator.
pub struct UuidKeyGenerator {
	settings: ConfiguredSettings<()>,
}

impl UuidKeyGenerator {
	/// Type name this generator answers to.
	pub const TYPE: &'static str = "UUID";

	/// Creates an unconfigured generator.
	pub fn new() -> Self {
		Self {
			settings: ConfiguredSettings::new(),
		}
	}
}

impl Default for UuidKeyGenerator {
	fn default() -> Self {
		Self::new()
	}
}

impl KeyGeneratorInterface for UuidKeyGenerator {
	fn type_name(&self) -> &'static str {
		Self::TYPE
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(UuidSchema)
	}

	fn configure(&mut self, properties: &Properties) -> Result<(), KeyGeneratorError> {
		UuidSchema.validate(properties)?;
		self.settings.apply(Self::TYPE, properties, ())
	}

	fn properties(&self) -> Option<&Properties> {
		self.settings.properties()
	}

	fn generate_key(&self) -> Result<GeneratedKey, KeyGeneratorError> {
		// Locks out configuration once keys have been handed out.
		self.settings.get_or_default();
		Ok(GeneratedKey::Text(
			::uuid::Uuid::new_v4().simple().to_string(),
		))
	}
}

/// Configuration schema for UuidKeyGenerator.
pub struct UuidSchema;

impl ConfigSchema for UuidSchema {
	fn validate(&self, properties: &Properties) -> Result<(), ValidationError> {
		// UUID generation has no configuration
		let schema = Schema::new(vec![], vec![]);
		schema.validate_properties(properties)
	}
}

/// Factory function to create an unconfigured UUID generator.
pub fn create_key_generator() -> Box<dyn KeyGeneratorInterface> {
	Box::new(UuidKeyGenerator::new())
}

/// Registry for the UUID implementation.
pub struct Registry;

impl keygen_types::ImplementationRegistry for Registry {
	const NAME: &'static str = UuidKeyGenerator::TYPE;
	type Factory = crate::KeyGeneratorConstructor;

	fn factory() -> Self::Factory {
		create_key_generator
	}
}

impl crate::KeyGeneratorRegistry for Registry {}
