//! Native plugin loading
//!
//! Plugins are shared libraries exporting a `PluginDeclaration` through
//! `declare_plugin!`.

pub mod loader;

pub use loader::NativeLoader;
