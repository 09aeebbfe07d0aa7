//! Property sets supplied to key generators.
//!
//! Properties are an opaque name to value mapping. The core mandates no keys;
//! each generator reads the subset it understands and ignores the rest.
//! Values arrive either from TOML configuration (typed) or from flat
//! property files (strings), so numeric lookups accept both forms.

use crate::ValidationError;
use serde::{Deserialize, Serialize};

/// Configuration properties for a single key generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(toml::Table);

impl Properties {
	/// Creates an empty property set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the property set with `key` set to `value`.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
		self.insert(key, value);
		self
	}

	/// Sets `key` to `value`, returning the previous value if any.
	pub fn insert(
		&mut self,
		key: impl Into<String>,
		value: impl Into<toml::Value>,
	) -> Option<toml::Value> {
		self.0.insert(key.into(), value.into())
	}

	/// Returns the raw value stored under `key`.
	pub fn get(&self, key: &str) -> Option<&toml::Value> {
		self.0.get(key)
	}

	/// Returns the value under `key` if it is a string.
	pub fn get_str(&self, key: &str) -> Option<&str> {
		self.0.get(key).and_then(|v| v.as_str())
	}

	/// Reads an unsigned integer property.
	///
	/// Accepts TOML integers and strings holding a decimal integer. Returns
	/// `Ok(None)` when the key is absent.
	pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ValidationError> {
		let Some(value) = self.0.get(key) else {
			return Ok(None);
		};

		let parsed = match value {
			toml::Value::Integer(i) => u64::try_from(*i).map_err(|_| ValidationError::InvalidValue {
				field: key.to_string(),
				message: format!("Value {} must not be negative", i),
			})?,
			toml::Value::String(s) => {
				s.trim()
					.parse::<u64>()
					.map_err(|e| ValidationError::InvalidValue {
						field: key.to_string(),
						message: format!("'{}' is not an unsigned integer: {}", s, e),
					})?
			},
			other => {
				return Err(ValidationError::TypeMismatch {
					field: key.to_string(),
					expected: "integer".to_string(),
					actual: other.type_str().to_string(),
				})
			},
		};

		Ok(Some(parsed))
	}

	/// Returns true if no properties are set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns the number of properties.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Iterates over the properties in key order.
	pub fn iter(&self) -> impl Iterator<Item = (&String, &toml::Value)> {
		self.0.iter()
	}
}

impl From<toml::Table> for Properties {
	fn from(table: toml::Table) -> Self {
		Self(table)
	}
}

impl<K: Into<String>, V: Into<toml::Value>> FromIterator<(K, V)> for Properties {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self(
			iter.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		)
	}
}
