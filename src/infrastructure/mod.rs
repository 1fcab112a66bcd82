//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Adapters: The OneBot WebSocket endpoint
//! - Plugins: Shared library loading

pub mod config;
pub mod adapters;
pub mod plugins;
