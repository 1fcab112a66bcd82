//! Plugin system for amadeus-relay
//!
//! Plugins are shared libraries loaded at run time. Each one implements the
//! [`Plugin`] trait, exports a [`PluginDeclaration`] via [`declare_plugin!`],
//! and talks to the host over its own bounded [`Communication`] channel.

pub mod communication;
pub mod handle;
pub mod manager;
pub mod trait_def;

pub use communication::{Communication, Incoming, Payload, DEFAULT_CHANNEL_CAPACITY};
pub use handle::{Artifact, ArtifactLoader, ModuleHandle, ResourceHandle};
pub use manager::{LoadOptions, PluginInfo, PluginManager, SharedPluginManager};
pub use trait_def::{
    Plugin, PluginCreateFn, PluginDeclaration, API_VERSION, ENTRY_SYMBOL, PLUGIN_ABI_VERSION,
    PLUGIN_MAGIC,
};
