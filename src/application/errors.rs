//! Application layer errors

use std::path::PathBuf;
use thiserror::Error;

/// General relay errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Not connected")]
    NotConnected,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Plugin lifecycle errors. Each load stage has its own variant so callers
/// can tell which step failed.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Failed to open plugin file {path}: {source}")]
    ResourceOpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load library {path}: {reason}")]
    ArtifactLoadFailed { path: PathBuf, reason: String },

    #[error("Entry symbol `{symbol}` not found in {path}: {reason}")]
    EntrySymbolMissing {
        path: PathBuf,
        symbol: String,
        reason: String,
    },

    #[error("Invalid entry symbol in {path}: {reason}")]
    InvalidEntrySymbol { path: PathBuf, reason: String },

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Plugin '{0}' already loaded")]
    AlreadyLoaded(String),

    #[error("Failed to close plugin file for '{name}': {source}")]
    ResourceCloseFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A lifecycle hook panicked. The plugin was released and is not registered.
    #[error("Plugin '{name}' panicked in {hook}")]
    Panicked { name: String, hook: &'static str },
}

/// Communication channel errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel is full")]
    Full,

    #[error("Channel is closed")]
    Closed,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PluginResult<T> = Result<T, PluginError>;
