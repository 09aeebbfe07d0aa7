//! Write-once settings shared by the built-in generators.

use crate::KeyGeneratorError;
use keygen_types::Properties;
use std::sync::OnceLock;

struct Applied<T> {
	properties: Option<Properties>,
	settings: T,
}

/// Holds a generator's parsed settings.
///
/// Settings are fixed either by an explicit `apply` or by the first
/// `get_or_default`, whichever happens first. After that they never change.
pub(crate) struct ConfiguredSettings<T> {
	inner: OnceLock<Applied<T>>,
}

impl<T> ConfiguredSettings<T> {
	pub(crate) fn new() -> Self {
		Self {
			inner: OnceLock::new(),
		}
	}

	/// Fixes the settings, failing if they are already fixed.
	pub(crate) fn apply(
		&self,
		type_name: &'static str,
		properties: &Properties,
		settings: T,
	) -> Result<(), KeyGeneratorError> {
		self.inner
			.set(Applied {
				properties: Some(properties.clone()),
				settings,
			})
			.map_err(|_| KeyGeneratorError::AlreadyConfigured(type_name))
	}

	pub(crate) fn properties(&self) -> Option<&Properties> {
		self.inner.get().and_then(|a| a.properties.as_ref())
	}

	/// Returns the settings without fixing them.
	pub(crate) fn peek(&self) -> Option<&T> {
		self.inner.get().map(|a| &a.settings)
	}
}

impl<T: Default> ConfiguredSettings<T> {
	/// Returns the settings, fixing them to defaults if nothing was applied.
	pub(crate) fn get_or_default(&self) -> &T {
		&self
			.inner
			.get_or_init(|| Applied {
				properties: None,
				settings: T::default(),
			})
			.settings
	}
}
