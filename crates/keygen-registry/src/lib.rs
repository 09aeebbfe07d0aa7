//! Extension registry for pluggable implementations.
//!
//! This module provides a catalog of implementations keyed by the capability
//! they provide. A capability is a marker type implementing [`Extension`]
//! that knows how to enumerate its implementations. The registry records
//! those descriptors once, keeps them for the life of the registry, and
//! constructs brand-new instances on every request.
//!
//! The registry knows nothing about selection or configuration. Consumers
//! such as the key generator factory decide which instance to use.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use keygen_types::ImplementationRegistry;
use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Errors that can occur while discovering or enumerating implementations.
#[derive(Debug, Error)]
pub enum RegistryError {
	/// A capability produced a descriptor that cannot be registered.
	#[error("Discovery of {capability} implementations failed: {message}")]
	Discovery {
		capability: &'static str,
		message: String,
	},
	/// The catalog entry for a capability does not hold its descriptors.
	#[error("Catalog entry for {0} holds an unexpected type")]
	CorruptedCatalog(&'static str),
}

/// A capability that implementations can be registered for.
///
/// Implement this on a marker type. `discover` must not call back into the
/// registry that is registering it.
pub trait Extension: 'static {
	/// Human readable capability name used in logs and errors.
	const CAPABILITY: &'static str;

	/// The trait object every implementation of this capability produces.
	type Instance: ?Sized + 'static;

	/// Enumerates the implementations shipped with this capability, in a
	/// stable order.
	fn discover() -> Vec<ExtensionDescriptor<Self::Instance>>;
}

/// Immutable record binding a capability to one concrete implementation.
pub struct ExtensionDescriptor<T: ?Sized> {
	name: &'static str,
	constructor: fn() -> Box<T>,
}

impl<T: ?Sized> ExtensionDescriptor<T> {
	/// Creates a descriptor from a name and constructor.
	pub fn new(name: &'static str, constructor: fn() -> Box<T>) -> Self {
		Self { name, constructor }
	}

	/// Creates a descriptor from an implementation's `Registry` declaration.
	pub fn from_registry<R>() -> Self
	where
		R: ImplementationRegistry<Factory = fn() -> Box<T>>,
	{
		Self::new(R::NAME, R::factory())
	}

	/// Name the implementation was declared under.
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Constructs a fresh instance.
	pub fn instantiate(&self) -> Box<T> {
		(self.constructor)()
	}
}

impl<T: ?Sized> Clone for ExtensionDescriptor<T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T: ?Sized> Copy for ExtensionDescriptor<T> {}

impl<T: ?Sized> fmt::Debug for ExtensionDescriptor<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ExtensionDescriptor")
			.field("name", &self.name)
			.finish()
	}
}

type Descriptors<E> = Vec<ExtensionDescriptor<<E as Extension>::Instance>>;

/// Catalog of discovered implementations, per capability.
///
/// Registration is idempotent and the catalog is append-only. The registry
/// never keeps a reference to the instances it constructs.
#[derive(Default)]
pub struct ExtensionRegistry {
	catalog: DashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<ExtensionRegistry>> = OnceLock::new();

impl ExtensionRegistry {
	/// Creates an empty, isolated registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the process-wide registry, creating it on first use.
	pub fn global() -> Arc<ExtensionRegistry> {
		Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(ExtensionRegistry::new())))
	}

	/// Records that implementations of `E` are discoverable.
	///
	/// The first call runs `E::discover` and validates the descriptors; any
	/// later call returns immediately. Concurrent first callers are
	/// serialized on the catalog entry, so discovery runs once and nobody
	/// observes a partial list.
	pub fn register<E: Extension>(&self) -> Result<(), RegistryError> {
		if self.catalog.contains_key(&TypeId::of::<E>()) {
			return Ok(());
		}

		match self.catalog.entry(TypeId::of::<E>()) {
			Entry::Occupied(_) => Ok(()),
			Entry::Vacant(slot) => {
				let descriptors = discover::<E>()?;
				tracing::debug!(
					capability = E::CAPABILITY,
					implementations = descriptors.len(),
					"Registered capability"
				);
				slot.insert(Box::new(descriptors));
				Ok(())
			},
		}
	}

	/// Returns true once `E` has been registered.
	pub fn is_registered<E: Extension>(&self) -> bool {
		self.catalog.contains_key(&TypeId::of::<E>())
	}

	/// Adds an implementation discovered after `E` was registered.
	///
	/// Registers `E` first if needed. The descriptor goes after every
	/// existing one, so earlier implementations keep precedence.
	pub fn append<E: Extension>(
		&self,
		descriptor: ExtensionDescriptor<E::Instance>,
	) -> Result<(), RegistryError> {
		check_descriptor::<E>(&descriptor)?;
		self.register::<E>()?;

		let mut entry = self
			.catalog
			.get_mut(&TypeId::of::<E>())
			.ok_or(RegistryError::CorruptedCatalog(E::CAPABILITY))?;
		let descriptors = entry
			.downcast_mut::<Descriptors<E>>()
			.ok_or(RegistryError::CorruptedCatalog(E::CAPABILITY))?;

		if descriptors
			.iter()
			.any(|d| d.name.eq_ignore_ascii_case(descriptor.name))
		{
			tracing::debug!(
				capability = E::CAPABILITY,
				implementation = descriptor.name,
				"Appended implementation is shadowed by an earlier one"
			);
		}
		descriptors.push(descriptor);

		tracing::debug!(
			capability = E::CAPABILITY,
			implementation = descriptor.name,
			"Appended implementation"
		);
		Ok(())
	}

	/// Returns a copy of the descriptors for `E`, in discovery order.
	pub fn descriptors<E: Extension>(&self) -> Result<Descriptors<E>, RegistryError> {
		self.register::<E>()?;

		let entry = self
			.catalog
			.get(&TypeId::of::<E>())
			.ok_or(RegistryError::CorruptedCatalog(E::CAPABILITY))?;
		entry
			.downcast_ref::<Descriptors<E>>()
			.cloned()
			.ok_or(RegistryError::CorruptedCatalog(E::CAPABILITY))
	}

	/// Returns the declared names of every implementation of `E`.
	pub fn descriptor_names<E: Extension>(&self) -> Result<Vec<&'static str>, RegistryError> {
		Ok(self.descriptors::<E>()?.iter().map(|d| d.name).collect())
	}

	/// Constructs one fresh instance per implementation of `E`.
	///
	/// Instances come back in discovery order. Nothing is cached: every call
	/// builds new objects. A capability with no implementations yields an
	/// empty vector.
	pub fn new_instances<E: Extension>(&self) -> Result<Vec<Box<E::Instance>>, RegistryError> {
		// Constructors run outside the catalog lock.
		let descriptors = self.descriptors::<E>()?;
		Ok(descriptors.iter().map(|d| d.instantiate()).collect())
	}
}

impl fmt::Debug for ExtensionRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ExtensionRegistry")
			.field("capabilities", &self.catalog.len())
			.finish()
	}
}

/// Runs discovery for `E` and validates the result.
fn discover<E: Extension>() -> Result<Descriptors<E>, RegistryError> {
	let descriptors = E::discover();

	let mut seen = HashSet::new();
	for descriptor in &descriptors {
		check_descriptor::<E>(descriptor)?;
		if !seen.insert(descriptor.name.to_ascii_lowercase()) {
			tracing::debug!(
				capability = E::CAPABILITY,
				implementation = descriptor.name,
				"Duplicate implementation name, earlier one takes precedence"
			);
		}
	}

	Ok(descriptors)
}

fn check_descriptor<E: Extension>(
	descriptor: &ExtensionDescriptor<E::Instance>,
) -> Result<(), RegistryError> {
	if descriptor.name.trim().is_empty() {
		return Err(RegistryError::Discovery {
			capability: E::CAPABILITY,
			message: "implementation name cannot be empty".into(),
		});
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	trait Counter: Send {
		fn label(&self) -> &'static str;
		fn bump(&mut self) -> u32;
	}

	#[derive(Default)]
	struct Ones(u32);

	impl Counter for Ones {
		fn label(&self) -> &'static str {
			"ones"
		}

		fn bump(&mut self) -> u32 {
			self.0 += 1;
			self.0
		}
	}

	#[derive(Default)]
	struct Tens(u32);

	impl Counter for Tens {
		fn label(&self) -> &'static str {
			"tens"
		}

		fn bump(&mut self) -> u32 {
			self.0 += 10;
			self.0
		}
	}

	fn new_ones() -> Box<dyn Counter> {
		Box::new(Ones::default())
	}

	fn new_tens() -> Box<dyn Counter> {
		Box::new(Tens::default())
	}

	struct OnesRegistry;

	impl ImplementationRegistry for OnesRegistry {
		const NAME: &'static str = "ones";
		type Factory = fn() -> Box<dyn Counter>;

		fn factory() -> Self::Factory {
			new_ones
		}
	}

	struct Counters;

	impl Extension for Counters {
		const CAPABILITY: &'static str = "counter";
		type Instance = dyn Counter;

		fn discover() -> Vec<ExtensionDescriptor<dyn Counter>> {
			vec![
				ExtensionDescriptor::from_registry::<OnesRegistry>(),
				ExtensionDescriptor::new("tens", new_tens),
			]
		}
	}

	static COUNTED_DISCOVERIES: AtomicUsize = AtomicUsize::new(0);

	struct CountedCounters;

	impl Extension for CountedCounters {
		const CAPABILITY: &'static str = "counted-counter";
		type Instance = dyn Counter;

		fn discover() -> Vec<ExtensionDescriptor<dyn Counter>> {
			COUNTED_DISCOVERIES.fetch_add(1, Ordering::SeqCst);
			vec![ExtensionDescriptor::new("ones", new_ones)]
		}
	}

	struct NoCounters;

	impl Extension for NoCounters {
		const CAPABILITY: &'static str = "nothing";
		type Instance = dyn Counter;

		fn discover() -> Vec<ExtensionDescriptor<dyn Counter>> {
			Vec::new()
		}
	}

	struct MalformedCounters;

	impl Extension for MalformedCounters {
		const CAPABILITY: &'static str = "malformed";
		type Instance = dyn Counter;

		fn discover() -> Vec<ExtensionDescriptor<dyn Counter>> {
			vec![
				ExtensionDescriptor::new("ones", new_ones),
				ExtensionDescriptor::new(" ", new_tens),
			]
		}
	}

	#[test]
	fn test_new_instances_in_discovery_order() {
		let registry = ExtensionRegistry::new();
		let instances = registry.new_instances::<Counters>().unwrap();

		let labels: Vec<_> = instances.iter().map(|c| c.label()).collect();
		assert_eq!(labels, vec!["ones", "tens"]);
	}

	#[test]
	fn test_register_is_idempotent() {
		let registry = ExtensionRegistry::new();
		registry.register::<Counters>().unwrap();
		let once = registry.new_instances::<Counters>().unwrap().len();

		for _ in 0..5 {
			registry.register::<Counters>().unwrap();
		}
		let many = registry.new_instances::<Counters>().unwrap().len();

		assert_eq!(once, many);
		assert_eq!(
			registry.descriptor_names::<Counters>().unwrap(),
			vec!["ones", "tens"]
		);
	}

	#[test]
	fn test_instances_are_never_shared() {
		let registry = ExtensionRegistry::new();
		let mut first = registry.new_instances::<Counters>().unwrap();
		let mut second = registry.new_instances::<Counters>().unwrap();

		assert_eq!(first[0].bump(), 1);
		assert_eq!(first[0].bump(), 2);
		// The second batch starts from scratch.
		assert_eq!(second[0].bump(), 1);
		assert_eq!(second[1].bump(), 10);
	}

	#[test]
	fn test_empty_capability_is_not_an_error() {
		let registry = ExtensionRegistry::new();
		let instances = registry.new_instances::<NoCounters>().unwrap();
		assert!(instances.is_empty());
		assert!(registry.is_registered::<NoCounters>());
	}

	#[test]
	fn test_malformed_descriptor_fails_registration() {
		let registry = ExtensionRegistry::new();
		let err = registry.register::<MalformedCounters>().unwrap_err();

		assert!(matches!(
			err,
			RegistryError::Discovery {
				capability: "malformed",
				..
			}
		));
		assert!(!registry.is_registered::<MalformedCounters>());
	}

	#[test]
	fn test_append_keeps_earlier_precedence() {
		let registry = ExtensionRegistry::new();
		registry
			.append::<Counters>(ExtensionDescriptor::new("ones", new_tens))
			.unwrap();

		let names = registry.descriptor_names::<Counters>().unwrap();
		assert_eq!(names, vec!["ones", "tens", "ones"]);

		let instances = registry.new_instances::<Counters>().unwrap();
		assert_eq!(instances.len(), 3);
		assert_eq!(instances[0].label(), "ones");
		assert_eq!(instances[2].label(), "tens");
	}

	#[test]
	fn test_append_rejects_empty_name() {
		let registry = ExtensionRegistry::new();
		let result = registry.append::<Counters>(ExtensionDescriptor::new("", new_ones));
		assert!(result.is_err());
		assert!(!registry.is_registered::<Counters>());
	}

	#[test]
	fn test_isolated_registries_do_not_share_appends() {
		let first = ExtensionRegistry::new();
		let second = ExtensionRegistry::new();
		first
			.append::<Counters>(ExtensionDescriptor::new("extra", new_ones))
			.unwrap();

		assert_eq!(first.new_instances::<Counters>().unwrap().len(), 3);
		assert_eq!(second.new_instances::<Counters>().unwrap().len(), 2);
	}

	#[test]
	fn test_concurrent_first_use_discovers_once() {
		let registry = Arc::new(ExtensionRegistry::new());
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let registry = Arc::clone(&registry);
				std::thread::spawn(move || registry.new_instances::<CountedCounters>().unwrap().len())
			})
			.collect();

		for handle in handles {
			assert_eq!(handle.join().unwrap(), 1);
		}
		assert_eq!(COUNTED_DISCOVERIES.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_global_registry_is_shared() {
		let a = ExtensionRegistry::global();
		let b = ExtensionRegistry::global();
		assert!(Arc::ptr_eq(&a, &b));
	}
}
