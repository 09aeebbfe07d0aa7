//! Common types module for the key generation system.
//!
//! This module defines the data types shared by the extension registry, the
//! key generator implementations and the configuration layer. Keeping them in
//! one crate lets implementation crates depend on the contract without
//! depending on each other.

/// Generated key values returned by key generators.
pub mod key;
/// Property sets handed to key generators at configuration time.
pub mod properties;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Configuration validation types for ensuring type-safe properties.
pub mod validation;

// Re-export all types for convenient access
pub use key::*;
pub use properties::*;
pub use registry::*;
pub use validation::*;
