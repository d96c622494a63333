//! Configuration management for the trigger runtime.
//!
//! Configuration is a JSON document; every field has a default so an empty
//! object is a valid configuration.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use schema::{PolicySettings, RuntimeConfig};
