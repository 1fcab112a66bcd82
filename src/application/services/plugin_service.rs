//! Plugin service - Plugin lifecycle for the running relay
//!
//! Wraps the plugin manager and keeps one forwarder task per plugin that
//! carries the plugin's outbound requests to the bot connection.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

use crate::application::errors::PluginResult;
use crate::domain::entities::Request;
use crate::domain::traits::Bot;
use crate::infrastructure::plugins::NativeLoader;
use crate::plugins::{Communication, SharedPluginManager};

pub struct PluginService<B> {
    manager: SharedPluginManager,
    bot: B,
    forwarders: Mutex<HashMap<String, JoinHandle<usize>>>,
}

impl<B> PluginService<B>
where
    B: Bot + Clone + 'static,
{
    pub fn new(manager: SharedPluginManager, bot: B) -> Self {
        Self {
            manager,
            bot,
            forwarders: Mutex::new(HashMap::new()),
        }
    }

    pub fn manager(&self) -> &SharedPluginManager {
        &self.manager
    }

    /// Load a plugin and start forwarding its outbound messages.
    /// Must be called from within a tokio runtime.
    pub fn load(&self, path: impl AsRef<Path>) -> PluginResult<String> {
        let name = self.manager.load(path)?;
        if let Some(stale) = self.spawn_forwarder(&name) {
            stale.abort();
        }
        Ok(name)
    }

    /// Reload a plugin and move forwarding to its new channel. Returns once
    /// the forwarder of the old channel has stopped.
    pub async fn reload(&self, name: &str, path: impl AsRef<Path>) -> PluginResult<()> {
        self.manager.reload(name, path)?;
        let previous = self.spawn_forwarder(name);
        join_forwarder(name, previous).await;
        Ok(())
    }

    /// Unload a plugin and wait for its forwarder to stop.
    pub async fn unload(&self, name: &str) -> PluginResult<()> {
        let result = self.manager.unload(name);
        let previous = self.forwarders().remove(name);
        join_forwarder(name, previous).await;
        result
    }

    /// Reload every plugin from the file it was loaded from. Returns the
    /// names that reloaded successfully.
    ///
    /// A file that is still open is not reread by the platform loader, so
    /// this restarts each plugin from the code already in memory. Replacing
    /// a library's code takes [`reload`](Self::reload) with a new file name.
    pub async fn reload_all(&self) -> Vec<String> {
        let mut reloaded = Vec::new();
        for info in self.manager.list_info() {
            match self.reload(&info.name, &info.path).await {
                Ok(()) => reloaded.push(info.name),
                Err(e) => tracing::warn!("Failed to reload plugin '{}': {}", info.name, e),
            }
        }
        reloaded
    }

    /// Load every plugin library found in `dir`. Failures are logged and skipped.
    pub fn load_directory(&self, dir: impl AsRef<Path>) -> Vec<String> {
        let dir = dir.as_ref();
        if !dir.exists() {
            tracing::warn!("Plugin directory does not exist: {}", dir.display());
            return Vec::new();
        }

        let paths = match NativeLoader::discover(dir) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!("Failed to read plugin directory {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut loaded = Vec::new();
        for path in paths {
            match self.load(&path) {
                Ok(name) => loaded.push(name),
                Err(e) => tracing::warn!("Failed to load plugin from {}: {}", path.display(), e),
            }
        }
        loaded
    }

    /// Names of plugins whose forwarder is still running, sorted
    pub fn forwarding(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .forwarders()
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Start a forwarder on the plugin's current channel. Returns the
    /// forwarder it replaces, if any.
    fn spawn_forwarder(&self, name: &str) -> Option<JoinHandle<usize>> {
        let comm = self.manager.communication(name)?;
        let task = tokio::spawn(forward(name.to_string(), comm, self.bot.clone()));
        self.forwarders().insert(name.to_string(), task)
    }

    fn forwarders(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<usize>>> {
        self.forwarders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wait for a replaced forwarder. Its channel is already closed, so it ends
/// after the request it may be sending.
async fn join_forwarder(name: &str, previous: Option<JoinHandle<usize>>) {
    let Some(task) = previous else {
        return;
    };
    match task.await {
        Ok(count) => tracing::debug!(
            "Previous forwarder for plugin '{}' stopped after {} requests",
            name,
            count
        ),
        Err(e) => tracing::warn!("Forwarder for plugin '{}' failed: {}", name, e),
    }
}

/// Drain a plugin's outbound queue. Payloads shaped like a request are sent
/// to the bot; anything else is only logged. Returns the number sent.
pub async fn forward<B: Bot>(name: String, comm: Communication, bot: B) -> usize {
    let mut forwarded = 0;

    while let Some(payload) = comm.recv().await {
        match Request::from_payload(&payload) {
            Some(request) => match bot.send_request(request).await {
                Ok(echo) => {
                    forwarded += 1;
                    tracing::debug!("Plugin '{}' request sent, echo {}", name, echo);
                }
                Err(e) => tracing::warn!("Plugin '{}' request not sent: {}", name, e),
            },
            None => tracing::debug!("Plugin '{}': {}", name, payload),
        }
    }

    tracing::debug!("Forwarder for plugin '{}' stopped", name);
    forwarded
}
