//! Monitor Configuration Module
//!
//! Provides the deployment configuration loaded from TOML files: hub
//! connection, backend URL, threshold margins, history capacity and view
//! limits.
//!
//! ## Loading Order
//!
//! 1. `LINEWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `linewatch.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! The loaded config is passed by reference to the components that need it;
//! there is no process-wide config singleton.

mod monitor_config;
pub mod defaults;

pub use monitor_config::*;
