//! Configuration management
//!
//! Handles loading and validation of tgm configuration from files
//! and environment variables.

pub mod loader;
pub mod schema;
pub mod validate;

pub use loader::ConfigLoader;
pub use schema::*;
pub use validate::validate_config;
