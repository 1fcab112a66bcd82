//! Application services - Business logic orchestration

pub mod plugin_service;

pub use plugin_service::PluginService;
