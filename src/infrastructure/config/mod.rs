//! Hierarchical configuration loading (defaults, YAML files, env vars).

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
