//! Module handle - Bookkeeping for one loaded plugin

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::communication::Communication;
use super::trait_def::{Plugin, PluginDeclaration};
use crate::application::errors::PluginError;

/// OS-level resource held open for as long as a plugin is loaded
pub trait ResourceHandle: Send + Sync {
    /// Release the resource, reporting any close failure.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// A loaded dynamic library
pub trait Artifact: Send + Sync {
    /// Resolve an exported plugin declaration.
    ///
    /// `Err` means the symbol could not be found; `Ok(None)` means it resolved
    /// to a null address.
    fn lookup(&self, symbol: &str) -> Result<Option<&PluginDeclaration>, String>;
}

/// Opens the resource handle and the library for a plugin path
pub trait ArtifactLoader: Send + Sync {
    fn open_resource(&self, path: &Path) -> io::Result<Box<dyn ResourceHandle>>;

    fn open_artifact(&self, path: &Path) -> Result<Box<dyn Artifact>, String>;
}

/// Everything the registry keeps for a loaded plugin.
///
/// Fields drop in declaration order: the instance must go before the
/// artifact that holds its code.
pub struct ModuleHandle {
    instance: Box<dyn Plugin>,
    communication: Communication,
    resource: Box<dyn ResourceHandle>,
    #[allow(dead_code)]
    artifact: Box<dyn Artifact>,
    path: PathBuf,
    loaded_at: DateTime<Utc>,
}

impl ModuleHandle {
    pub(crate) fn new(
        instance: Box<dyn Plugin>,
        communication: Communication,
        resource: Box<dyn ResourceHandle>,
        artifact: Box<dyn Artifact>,
        path: PathBuf,
    ) -> Self {
        Self {
            instance,
            communication,
            resource,
            artifact,
            path,
            loaded_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        self.instance.name()
    }

    pub fn version(&self) -> &str {
        self.instance.version()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Host end of the plugin's channel
    pub fn communication(&self) -> &Communication {
        &self.communication
    }

    /// Hand a fresh channel to the plugin, closing the one it replaces.
    /// Returns the hook name if the plugin panicked.
    pub(crate) fn rewire(
        &mut self,
        host: Communication,
        plugin: Communication,
    ) -> Result<(), &'static str> {
        let old = std::mem::replace(&mut self.communication, host);
        old.close();

        let instance = &mut self.instance;
        guarded(|| instance.set_communication(plugin)).map_err(|_| "set_communication")
    }

    /// Connect the plugin to its channel and run its install hook.
    /// Returns the hook name if the plugin panicked.
    pub(crate) fn activate(&mut self, plugin_end: Communication) -> Result<(), &'static str> {
        let instance = &mut self.instance;
        guarded(|| instance.set_communication(plugin_end)).map_err(|_| "set_communication")?;
        guarded(|| instance.install()).map_err(|_| "install")
    }

    /// Close the channel, uninstall the plugin, then release the resource and
    /// the library. A panicking `uninstall` does not stop the rest.
    pub(crate) fn teardown(self, key: &str) -> Result<(), PluginError> {
        let ModuleHandle {
            mut instance,
            communication,
            resource,
            artifact,
            ..
        } = self;

        communication.close();

        if guarded(|| instance.uninstall()).is_err() {
            tracing::warn!("Plugin '{}' panicked during uninstall", key);
        }
        drop(instance);

        let closed = resource.close();
        drop(artifact);

        closed.map_err(|source| PluginError::ResourceCloseFailed {
            name: key.to_string(),
            source,
        })
    }

    /// Release a handle whose plugin was never activated. No lifecycle hooks run.
    pub(crate) fn discard(self) {
        let ModuleHandle {
            instance,
            communication,
            resource,
            artifact,
            path,
            ..
        } = self;

        communication.close();
        drop(instance);
        if let Err(e) = resource.close() {
            tracing::warn!("Failed to close plugin file {}: {}", path.display(), e);
        }
        drop(artifact);
    }
}

/// Run a plugin hook with its panics contained.
fn guarded(hook: impl FnOnce()) -> Result<(), ()> {
    panic::catch_unwind(AssertUnwindSafe(hook)).map_err(|_| ())
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("path", &self.path)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}
