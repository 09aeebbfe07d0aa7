//! Type-selecting factory for key generators.
//!
//! The factory is the single entry point that turns a user-supplied type name
//! and property set into a configured generator. It asks the extension
//! registry for fresh instances of every key generator, keeps the first one
//! whose type name matches (ignoring ASCII case), configures it and hands it
//! over. It holds no state between calls.

use crate::{KeyGeneratorError, KeyGeneratorInterface, KeyGenerators};
use keygen_registry::ExtensionRegistry;
use keygen_types::Properties;
use std::sync::Arc;

/// Creates configured key generators by type name.
#[derive(Debug, Clone)]
pub struct KeyGeneratorFactory {
	registry: Arc<ExtensionRegistry>,
}

impl KeyGeneratorFactory {
	/// Creates a factory backed by `registry`.
	pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
		Self { registry }
	}

	/// Creates a factory backed by the process-wide registry.
	pub fn global() -> Self {
		Self::new(ExtensionRegistry::global())
	}

	/// The registry this factory enumerates.
	pub fn registry(&self) -> &Arc<ExtensionRegistry> {
		&self.registry
	}

	/// Type names of every registered key generator, in discovery order.
	pub fn available_types(&self) -> Result<Vec<&'static str>, KeyGeneratorError> {
		Ok(self.registry.descriptor_names::<KeyGenerators>()?)
	}

	/// Creates a configured key generator.
	///
	/// Type names are compared ignoring ASCII case only: "uuid" selects
	/// "UUID", but a name that only matches after Unicode case folding
	/// (for example "ſnowflake") does not. If several implementations share
	/// the type name, the earliest in discovery order wins. Errors raised by
	/// the implementation's `configure` are returned unchanged.
	///
	/// The factory holds no mutable state, so it can be shared across
	/// threads and called concurrently.
	///
	/// # Errors
	///
	/// - [`KeyGeneratorError::InvalidType`] if no implementation matches
	/// - whatever the selected implementation's `configure` returns
	/// - [`KeyGeneratorError::Registry`] if discovery fails
	pub fn new_instance(
		&self,
		generator_type: &str,
		properties: &Properties,
	) -> Result<Box<dyn KeyGeneratorInterface>, KeyGeneratorError> {
		let mut generator = self
			.registry
			.new_instances::<KeyGenerators>()?
			.into_iter()
			.find(|candidate| candidate.type_name().eq_ignore_ascii_case(generator_type))
			.ok_or_else(|| {
				tracing::debug!(requested = %generator_type, "No key generator matches type");
				KeyGeneratorError::InvalidType {
					requested: generator_type.to_string(),
				}
			})?;

		generator.configure(properties)?;
		tracing::debug!(
			implementation = generator.type_name(),
			properties = properties.len(),
			"Created key generator"
		);
		Ok(generator)
	}
}

impl Default for KeyGeneratorFactory {
	fn default() -> Self {
		Self::global()
	}
}
