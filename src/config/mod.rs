//! Receiver configuration
//!
//! Loaded from TOML files, with CLI flags applied on top by the binary.
//!
//! ## Loading Order
//!
//! 1. `PENDULUM_CONFIG` environment variable (path to TOML file)
//! 2. `receiver.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! The loaded value is passed explicitly to the components that need it.

mod receiver_config;
pub mod defaults;

pub use receiver_config::*;
