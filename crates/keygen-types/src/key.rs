//! Key values produced by key generators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A generated row key.
///
/// Time-ordered strategies produce numeric keys, random strategies produce
/// textual ones. The value serializes without a tag so it can be embedded
/// directly into JSON rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneratedKey {
	/// A 64-bit numeric key.
	Numeric(u64),
	/// A textual key.
	Text(String),
}

impl GeneratedKey {
	/// Returns the numeric value, if this is a numeric key.
	pub fn as_u64(&self) -> Option<u64> {
		match self {
			GeneratedKey::Numeric(value) => Some(*value),
			GeneratedKey::Text(_) => None,
		}
	}

	/// Returns the textual value, if this is a text key.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			GeneratedKey::Numeric(_) => None,
			GeneratedKey::Text(value) => Some(value),
		}
	}
}

impl fmt::Display for GeneratedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			GeneratedKey::Numeric(value) => write!(f, "{}", value),
			GeneratedKey::Text(value) => f.write_str(value),
		}
	}
}

impl From<u64> for GeneratedKey {
	fn from(value: u64) -> Self {
		GeneratedKey::Numeric(value)
	}
}

impl From<String> for GeneratedKey {
	fn from(value: String) -> Self {
		GeneratedKey::Text(value)
	}
}
