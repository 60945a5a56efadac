//! Configuration loading
//!
//! File-based configuration with environment variable overrides.

pub mod loader;

// Re-export commonly used items
pub use loader::{
    apply_env_overrides, load, load_from_env, load_from_file, parse_config, probe_config_paths,
};
