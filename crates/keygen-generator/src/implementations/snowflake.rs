//! Time-ordered 64-bit key generator.
//!
//! Keys are laid out as:
//!
//! ```text
//! | 1 bit sign (0) | 41 bits ms since epoch | 10 bits worker id | 12 bits sequence |
//! ```
//!
//! The epoch is 2016-11-01T00:00:00Z. Each shard must use a distinct worker
//! id; within one worker, keys are unique as long as the clock does not move
//! backwards by more than the configured tolerance.

use crate::configured::ConfiguredSettings;
use crate::time::{SystemTimeService, TimeService};
use crate::{KeyGeneratorError, KeyGeneratorInterface};
use keygen_types::{
	ConfigSchema, Field, FieldType, GeneratedKey, Properties, Schema, ValidationError,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Milliseconds since the Unix epoch of 2016-11-01T00:00:00Z.
pub const EPOCH_MILLIS: u64 = 1_477_958_400_000;

const SEQUENCE_BITS: u32 = 12;
const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_ID_LEFT_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_LEFT_SHIFT: u32 = WORKER_ID_LEFT_SHIFT + WORKER_ID_BITS;

/// Largest worker id that fits in the key layout.
pub const MAX_WORKER_ID: u64 = (1 << WORKER_ID_BITS) - 1;

/// Property naming the worker id.
pub const WORKER_ID_KEY: &str = "worker-id";
/// Property naming the tolerated clock rollback, in milliseconds.
pub const MAX_TOLERATE_TIME_DIFFERENCE_KEY: &str = "max-tolerate-time-difference-milliseconds";
/// Property naming the largest sequence offset used on a new millisecond.
pub const MAX_VIBRATION_OFFSET_KEY: &str = "max-vibration-offset";

const DEFAULT_MAX_TOLERATE_TIME_DIFFERENCE_MS: u64 = 10;
const DEFAULT_MAX_VIBRATION_OFFSET: u64 = 1;

/// Parsed snowflake properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnowflakeSettings {
	/// Worker id embedded in every key, 0..=1023.
	pub worker_id: u64,
	/// Clock rollback that is waited out instead of rejected.
	pub max_tolerate_time_difference_ms: u64,
	/// Sequence offsets cycle through 0..=max_vibration_offset so that
	/// low-traffic workers do not always emit even keys.
	pub max_vibration_offset: u64,
}

impl Default for SnowflakeSettings {
	fn default() -> Self {
		Self {
			worker_id: 0,
			max_tolerate_time_difference_ms: DEFAULT_MAX_TOLERATE_TIME_DIFFERENCE_MS,
			max_vibration_offset: DEFAULT_MAX_VIBRATION_OFFSET,
		}
	}
}

impl SnowflakeSettings {
	/// Validates and parses snowflake properties. Absent keys take defaults.
	pub fn from_properties(properties: &Properties) -> Result<Self, ValidationError> {
		SnowflakeSchema.validate(properties)?;

		let defaults = Self::default();
		Ok(Self {
			worker_id: properties
				.get_u64(WORKER_ID_KEY)?
				.unwrap_or(defaults.worker_id),
			max_tolerate_time_difference_ms: properties
				.get_u64(MAX_TOLERATE_TIME_DIFFERENCE_KEY)?
				.unwrap_or(defaults.max_tolerate_time_difference_ms),
			max_vibration_offset: properties
				.get_u64(MAX_VIBRATION_OFFSET_KEY)?
				.unwrap_or(defaults.max_vibration_offset),
		})
	}
}

/// The components of a snowflake key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnowflakeKeyParts {
	/// Unix milliseconds the key was minted at.
	pub timestamp_millis: u64,
	pub worker_id: u64,
	pub sequence: u64,
}

impl SnowflakeKeyParts {
	/// Splits a key into its components.
	pub fn parse(key: u64) -> Self {
		Self {
			timestamp_millis: (key >> TIMESTAMP_LEFT_SHIFT) + EPOCH_MILLIS,
			worker_id: (key >> WORKER_ID_LEFT_SHIFT) & MAX_WORKER_ID,
			sequence: key & SEQUENCE_MASK,
		}
	}
}

#[derive(Debug)]
struct SnowflakeState {
	last_millis: u64,
	sequence: u64,
	sequence_offset: Option<u64>,
}

impl SnowflakeState {
	fn vibrate_sequence_offset(&mut self, max_vibration_offset: u64) -> u64 {
		let next = match self.sequence_offset {
			Some(offset) if offset < max_vibration_offset => offset + 1,
			_ => 0,
		};
		self.sequence_offset = Some(next);
		next
	}
}

/// Snowflake key generator.
pub struct SnowflakeKeyGenerator {
	settings: ConfiguredSettings<SnowflakeSettings>,
	state: Mutex<SnowflakeState>,
	clock: Arc<dyn TimeService>,
}

impl SnowflakeKeyGenerator {
	/// Type name this generator answers to.
	pub const TYPE: &'static str = "SNOWFLAKE";

	/// Creates an unconfigured generator on the system clock.
	pub fn new() -> Self {
		Self::with_clock(Arc::new(SystemTimeService))
	}

	/// Creates an unconfigured generator reading time from `clock`.
	pub fn with_clock(clock: Arc<dyn TimeService>) -> Self {
		Self {
			settings: ConfiguredSettings::new(),
			state: Mutex::new(SnowflakeState {
				last_millis: 0,
				sequence: 0,
				sequence_offset: None,
			}),
			clock,
		}
	}

	/// The worker id keys will carry.
	pub fn worker_id(&self) -> u64 {
		self.settings
			.peek()
			.map(|s| s.worker_id)
			.unwrap_or(SnowflakeSettings::default().worker_id)
	}

	/// Generates the next key as a raw integer.
	pub fn next_id(&self) -> Result<u64, KeyGeneratorError> {
		let settings = *self.settings.get_or_default();
		let mut state = self
			.state
			.lock()
			.map_err(|_| KeyGeneratorError::Internal("snowflake state lock poisoned".into()))?;

		let mut current = self.clock.current_millis();
		if state.last_millis > current {
			let difference = state.last_millis - current;
			if difference >= settings.max_tolerate_time_difference_ms {
				return Err(KeyGeneratorError::ClockMovedBackwards {
					last: state.last_millis,
					current,
				});
			}
			tracing::warn!(
				difference_ms = difference,
				"Clock moved backwards, waiting for it to catch up"
			);
			self.clock.sleep(Duration::from_millis(difference));
			current = self.clock.current_millis();
			if state.last_millis > current {
				return Err(KeyGeneratorError::ClockMovedBackwards {
					last: state.last_millis,
					current,
				});
			}
		}

		if state.last_millis == current {
			state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
			if state.sequence == 0 {
				current = self.wait_until_after(current);
			}
		} else {
			state.sequence = state.vibrate_sequence_offset(settings.max_vibration_offset);
		}
		state.last_millis = current;

		let elapsed = current.checked_sub(EPOCH_MILLIS).ok_or_else(|| {
			KeyGeneratorError::Internal(format!("clock reads {} ms, before the key epoch", current))
		})?;

		Ok((elapsed << TIMESTAMP_LEFT_SHIFT)
			| (settings.worker_id << WORKER_ID_LEFT_SHIFT)
			| state.sequence)
	}

	fn wait_until_after(&self, last_millis: u64) -> u64 {
		loop {
			let now = self.clock.current_millis();
			if now > last_millis {
				return now;
			}
			self.clock.pause();
		}
	}
}

impl Default for SnowflakeKeyGenerator {
	fn default() -> Self {
		Self::new()
	}
}

impl KeyGeneratorInterface for SnowflakeKeyGenerator {
	fn type_name(&self) -> &'static str {
		Self::TYPE
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SnowflakeSchema)
	}

	fn configure(&mut self, properties: &Properties) -> Result<(), KeyGeneratorError> {
		if self.settings.peek().is_some() {
			return Err(KeyGeneratorError::AlreadyConfigured(Self::TYPE));
		}
		let settings = SnowflakeSettings::from_properties(properties)?;
		self.settings.apply(Self::TYPE, properties, settings)
	}

	fn properties(&self) -> Option<&Properties> {
		self.settings.properties()
	}

	fn generate_key(&self) -> Result<GeneratedKey, KeyGeneratorError> {
		self.next_id().map(GeneratedKey::Numeric)
	}
}

/// Configuration schema for SnowflakeKeyGenerator.
pub struct SnowflakeSchema;

impl ConfigSchema for SnowflakeSchema {
	fn validate(&self, properties: &Properties) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![],
			// Optional fields
			vec![
				Field::new(
					WORKER_ID_KEY,
					FieldType::Integer {
						min: Some(0),
						max: Some(MAX_WORKER_ID as i64),
					},
				),
				Field::new(
					MAX_TOLERATE_TIME_DIFFERENCE_KEY,
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
				Field::new(
					MAX_VIBRATION_OFFSET_KEY,
					FieldType::Integer {
						min: Some(0),
						max: Some(SEQUENCE_MASK as i64),
					},
				),
			],
		);

		schema.validate_properties(properties)
	}
}

/// Factory function to create an unconfigured snowflake generator.
///
/// Optional properties:
/// - `worker-id`: worker id embedded in keys (default: 0)
/// - `max-tolerate-time-difference-milliseconds`: tolerated clock rollback (default: 10)
/// - `max-vibration-offset`: largest sequence offset (default: 1)
pub fn create_key_generator() -> Box<dyn KeyGeneratorInterface> {
	Box::new(SnowflakeKeyGenerator::new())
}

/// Registry for the snowflake implementation.
pub struct Registry;

impl keygen_types::ImplementationRegistry for Registry {
	const NAME: &'static str = SnowflakeKeyGenerator::TYPE;
	type Factory = crate::KeyGeneratorConstructor;

	fn factory() -> Self::Factory {
		create_key_generator
	}
}

impl crate::KeyGeneratorRegistry for Registry {}
