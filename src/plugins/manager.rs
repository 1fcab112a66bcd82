//! Plugin manager - handles plugin lifecycle and communication wiring

use std::collections::HashMap;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::communication::{Communication, DEFAULT_CHANNEL_CAPACITY};
use super::handle::{Artifact, ArtifactLoader, ModuleHandle};
use super::trait_def::{Plugin, ENTRY_SYMBOL};
use crate::application::errors::{PluginError, PluginResult};
use crate::infrastructure::plugins::NativeLoader;

/// Options for [`PluginManager::load_with`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Replace a loaded plugin reporting the same name instead of failing.
    /// The displaced plugin is uninstalled first.
    pub replace: bool,
}

/// Plugin information for listing
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub loaded_at: DateTime<Utc>,
}

/// Thread-safe registry of loaded plugins, keyed by name
pub struct PluginManager {
    plugins: RwLock<HashMap<String, ModuleHandle>>,
    loader: Arc<dyn ArtifactLoader>,
    channel_capacity: usize,
}

impl PluginManager {
    /// Create a manager that loads native shared libraries
    pub fn new(channel_capacity: usize) -> Self {
        Self::with_loader(Arc::new(NativeLoader::new()), channel_capacity)
    }

    /// Create a manager with a custom artifact loader
    pub fn with_loader(loader: Arc<dyn ArtifactLoader>, channel_capacity: usize) -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            loader,
            channel_capacity,
        }
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Load a plugin library. Fails with `AlreadyLoaded` if a plugin with the
    /// same name is already registered. Returns the plugin's name.
    pub fn load(&self, path: impl AsRef<Path>) -> PluginResult<String> {
        self.load_with(path, LoadOptions::default())
    }

    /// Load a plugin library with explicit options
    pub fn load_with(&self, path: impl AsRef<Path>, options: LoadOptions) -> PluginResult<String> {
        let path = path.as_ref();
        let mut plugins = self.write();

        let (handle, plugin_end) = self.open(path)?;
        let name = handle.name().to_string();

        if plugins.contains_key(&name) && !options.replace {
            handle.discard();
            return Err(PluginError::AlreadyLoaded(name));
        }

        // A displaced plugin keeps running until its replacement is installed
        let handle = install_handle(handle, plugin_end, &name)?;
        info!("Loaded plugin: {} v{}", name, handle.version());

        if let Some(displaced) = plugins.insert(name.clone(), handle) {
            info!("Replaced plugin: {}", name);
            if let Err(e) = displaced.teardown(&name) {
                warn!("Failed to release replaced plugin '{}': {}", name, e);
            }
        }
        Ok(name)
    }

    /// Uninstall a plugin and remove it from the registry.
    ///
    /// The entry is removed even if closing its file fails; that error is
    /// still returned.
    pub fn unload(&self, name: &str) -> PluginResult<()> {
        let mut plugins = self.write();

        let handle = plugins
            .remove(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        handle.teardown(name)?;
        info!("Unloaded plugin: {}", name);
        Ok(())
    }

    /// Replace a plugin's instance with one loaded from `new_path`, keeping
    /// the registry key `name`. No state carries over to the new instance.
    ///
    /// The new instance is installed before the old one is torn down, so a
    /// failed reload leaves the old instance registered and running.
    ///
    /// While the old library is still open the platform loader hands back the
    /// same image for the same file, so reloading from an unchanged path
    /// restarts the plugin from the code already in memory. New code needs a
    /// new file name.
    pub fn reload(&self, name: &str, new_path: impl AsRef<Path>) -> PluginResult<()> {
        let new_path = new_path.as_ref();
        let mut plugins = self.write();

        let old_path = plugins
            .get(name)
            .map(|handle| handle.path().to_path_buf())
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        let (replacement, plugin_end) = self.open(new_path)?;
        if replacement.name() != name {
            warn!(
                "Plugin from {} reports name '{}', keeping registry key '{}'",
                new_path.display(),
                replacement.name(),
                name
            );
        }

        let replacement = install_handle(replacement, plugin_end, name)?;
        let version = replacement.version().to_string();

        if let Some(previous) = plugins.insert(name.to_string(), replacement) {
            if let Err(e) = previous.teardown(name) {
                warn!("Failed to release previous instance of '{}': {}", name, e);
            }
        }

        if old_path == new_path {
            info!("Restarted plugin: {} v{} (same file, code not reread)", name, version);
        } else {
            info!("Reloaded plugin: {} v{} from {}", name, version, new_path.display());
        }
        Ok(())
    }

    /// Names of all loaded plugins, in no particular order
    pub fn list(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Details of all loaded plugins, sorted by name
    pub fn list_info(&self) -> Vec<PluginInfo> {
        let mut infos: Vec<PluginInfo> = self
            .read()
            .iter()
            .map(|(key, handle)| info_of(key, handle))
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn info(&self, name: &str) -> Option<PluginInfo> {
        self.read().get(name).map(|handle| info_of(name, handle))
    }

    /// Give a loaded plugin a new channel. `plugin` is handed to the plugin's
    /// `set_communication` hook and `host` becomes the registry's end; the
    /// previous channel is closed. Returns `false` if no such plugin exists.
    ///
    /// A plugin that panics while being rewired is torn down and removed.
    pub fn set_communication(
        &self,
        name: &str,
        host: Communication,
        plugin: Communication,
    ) -> PluginResult<bool> {
        let mut plugins = self.write();

        let Some(handle) = plugins.get_mut(name) else {
            return Ok(false);
        };

        match handle.rewire(host, plugin) {
            Ok(()) => {
                info!("Rewired communication for plugin: {}", name);
                Ok(true)
            }
            Err(hook) => {
                if let Some(broken) = plugins.remove(name) {
                    release(broken, name);
                }
                Err(PluginError::Panicked {
                    name: name.to_string(),
                    hook,
                })
            }
        }
    }

    /// Host end of a plugin's channel. Send on the returned clone, not under the lock.
    pub fn communication(&self, name: &str) -> Option<Communication> {
        self.read()
            .get(name)
            .map(|handle| handle.communication().clone())
    }

    /// Host ends of every plugin's channel, with their registry keys
    pub fn communications(&self) -> Vec<(String, Communication)> {
        self.read()
            .iter()
            .map(|(key, handle)| (key.clone(), handle.communication().clone()))
            .collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unload every plugin. Failures are logged; returns how many were unloaded.
    pub fn unload_all(&self) -> usize {
        let mut plugins = self.write();
        let count = plugins.len();

        for (name, handle) in plugins.drain() {
            match handle.teardown(&name) {
                Ok(()) => info!("Unloaded plugin: {}", name),
                Err(e) => warn!("Failed to unload plugin '{}': {}", name, e),
            }
        }
        count
    }

    /// Open the resource and library at `path` and create the plugin.
    /// Whatever was opened is released again if a later step fails.
    fn open(&self, path: &Path) -> PluginResult<(ModuleHandle, Communication)> {
        let resource =
            self.loader
                .open_resource(path)
                .map_err(|source| PluginError::ResourceOpenFailed {
                    path: path.to_path_buf(),
                    source,
                })?;

        match self.instantiate(path) {
            Ok((instance, artifact)) => {
                let (host, plugin_end) = Communication::pair(self.channel_capacity);
                let handle =
                    ModuleHandle::new(instance, host, resource, artifact, path.to_path_buf());
                Ok((handle, plugin_end))
            }
            Err(e) => {
                if let Err(close_err) = resource.close() {
                    warn!(
                        "Failed to close plugin file {}: {}",
                        path.display(),
                        close_err
                    );
                }
                Err(e)
            }
        }
    }

    fn instantiate(&self, path: &Path) -> PluginResult<(Box<dyn Plugin>, Box<dyn Artifact>)> {
        let artifact =
            self.loader
                .open_artifact(path)
                .map_err(|reason| PluginError::ArtifactLoadFailed {
                    path: path.to_path_buf(),
                    reason,
                })?;

        let create = {
            let declaration = artifact
                .lookup(ENTRY_SYMBOL)
                .map_err(|reason| PluginError::EntrySymbolMissing {
                    path: path.to_path_buf(),
                    symbol: ENTRY_SYMBOL.to_string(),
                    reason,
                })?
                .ok_or_else(|| PluginError::InvalidEntrySymbol {
                    path: path.to_path_buf(),
                    reason: "entry symbol is null".to_string(),
                })?;

            declaration
                .validate()
                .map_err(|reason| PluginError::InvalidEntrySymbol {
                    path: path.to_path_buf(),
                    reason,
                })?;
            declaration.create
        };

        let instance = panic::catch_unwind(create).map_err(|_| PluginError::Panicked {
            name: path.display().to_string(),
            hook: "create",
        })?;
        Ok((instance, artifact))
    }

    // Plugin hooks run under `catch_unwind`, so the map is never left half
    // updated and a poisoned lock is safe to keep using.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ModuleHandle>> {
        self.plugins.read().unwrap_or_else(|poisoned| {
            warn!("Plugin registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ModuleHandle>> {
        self.plugins.write().unwrap_or_else(|poisoned| {
            warn!("Plugin registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Wire and install a freshly opened plugin. If a hook panics the plugin is
/// torn down again and never reaches the registry.
fn install_handle(
    mut handle: ModuleHandle,
    plugin_end: Communication,
    key: &str,
) -> PluginResult<ModuleHandle> {
    match handle.activate(plugin_end) {
        Ok(()) => Ok(handle),
        Err(hook) => {
            warn!("Plugin '{}' panicked in {}, releasing it", key, hook);
            release(handle, key);
            Err(PluginError::Panicked {
                name: key.to_string(),
                hook,
            })
        }
    }
}

fn release(handle: ModuleHandle, key: &str) {
    if let Err(e) = handle.teardown(key) {
        warn!("Failed to release plugin '{}': {}", key, e);
    }
}

fn info_of(key: &str, handle: &ModuleHandle) -> PluginInfo {
    PluginInfo {
        name: key.to_string(),
        version: handle.version().to_string(),
        path: handle.path().to_path_buf(),
        loaded_at: handle.loaded_at(),
    }
}

/// Thread-safe handle to a PluginManager
pub type SharedPluginManager = Arc<PluginManager>;

/// Create a new shared plugin manager
pub fn create_plugin_manager(channel_capacity: usize) -> SharedPluginManager {
    Arc::new(PluginManager::new(channel_capacity))
}
