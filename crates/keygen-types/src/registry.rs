//! Registry trait for self-registering implementations.
//!
//! Every key generator module exposes a zero-sized `Registry` struct that
//! implements this trait, declaring the type name it answers to and the
//! constructor the extension registry calls to mint fresh instances.

/// Base trait for implementation registries.
///
/// Each implementation module must provide a Registry struct that implements
/// this trait. This ensures that every implementation declares its type name
/// and provides a factory function.
pub trait ImplementationRegistry {
	/// The type name used in configuration files to reference this implementation.
	///
	/// This should match the `type` key of a table's key generator section,
	/// for example "SNOWFLAKE" or "UUID". Matching is case-insensitive.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	///
	/// Each capability defines its own factory type, for example
	/// `KeyGeneratorConstructor` for key generators.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
