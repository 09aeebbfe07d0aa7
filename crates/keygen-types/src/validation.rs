//! Property validation utilities for key generators.
//!
//! This module provides a small schema framework used by every key generator
//! to check its properties before applying them. It supports required and
//! optional fields, bounded integers and custom validators. Unknown keys are
//! ignored.

use crate::Properties;
use thiserror::Error;

/// Errors that can occur during property validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
	/// Error that occurs when a required field is missing.
	#[error("Missing required field: {0}")]
	MissingField(String),
	/// Error that occurs when a field has an invalid value.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	/// Error that occurs when field type is incorrect.
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// Represents the type of a property field.
#[derive(Debug)]
pub enum FieldType {
	/// A string value.
	String,
	/// An integer value with optional minimum and maximum bounds.
	///
	/// Strings holding a decimal integer are accepted too, since property
	/// files carry every value as text.
	Integer {
		/// Minimum allowed value (inclusive).
		min: Option<i64>,
		/// Maximum allowed value (inclusive).
		max: Option<i64>,
	},
	/// A boolean value (true/false).
	Boolean,
}

/// Type alias for field validator functions.
///
/// Validators receive the raw TOML value and return an error message if
/// validation fails.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A field in a property schema.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	/// Creates a new field with the given name and type.
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom validator to this field.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		match self.field_type {
			FieldType::String if !value.is_str() => {
				return Err(self.mismatch("string", value));
			},
			FieldType::Boolean if !value.is_bool() => {
				return Err(self.mismatch("boolean", value));
			},
			FieldType::Integer { min, max } => {
				let int_val = integer_value(&self.name, value)?;
				if let Some(min) = min.filter(|min| int_val < *min) {
					return Err(ValidationError::InvalidValue {
						field: self.name.clone(),
						message: format!("Value {} is less than minimum {}", int_val, min),
					});
				}
				if let Some(max) = max.filter(|max| int_val > *max) {
					return Err(ValidationError::InvalidValue {
						field: self.name.clone(),
						message: format!("Value {} is greater than maximum {}", int_val, max),
					});
				}
			},
			_ => {},
		}

		match &self.validator {
			Some(validator) => validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			}),
			None => Ok(()),
		}
	}

	fn mismatch(&self, expected: &str, value: &toml::Value) -> ValidationError {
		ValidationError::TypeMismatch {
			field: self.name.clone(),
			expected: expected.to_string(),
			actual: value.type_str().to_string(),
		}
	}
}

/// Defines a validation schema for a property set.
///
/// A schema consists of required fields that must be present and optional
/// fields that may be present. Keys the schema does not mention are ignored.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	/// Creates a new schema with required and optional fields.
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a property set against this schema.
	///
	/// # Errors
	///
	/// Returns an error if:
	/// - A required field is missing
	/// - A field has the wrong type or is out of bounds
	/// - A custom validator fails
	pub fn validate_properties(&self, properties: &Properties) -> Result<(), ValidationError> {
		for field in &self.required {
			let value = properties
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = properties.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

/// Reads an integer out of a TOML integer or a numeric string.
fn integer_value(field_name: &str, value: &toml::Value) -> Result<i64, ValidationError> {
	match value {
		toml::Value::Integer(i) => Ok(*i),
		toml::Value::String(s) => s
			.trim()
			.parse::<i64>()
			.map_err(|_| ValidationError::InvalidValue {
				field: field_name.to_string(),
				message: format!("'{}' is not an integer", s),
			}),
		other => Err(ValidationError::TypeMismatch {
			field: field_name.to_string(),
			expected: "integer".to_string(),
			actual: other.type_str().to_string(),
		}),
	}
}

/// Trait defining a property schema for a key generator.
///
/// Each key generator returns one of these from `config_schema` so callers can
/// check properties ahead of building the generator.
pub trait ConfigSchema: Send + Sync {
	/// Validates a property set against this schema.
	fn validate(&self, properties: &Properties) -> Result<(), ValidationError>;
}
