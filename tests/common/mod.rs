//! Test doubles: a loader that never touches the filesystem, a plugin that
//! records its lifecycle calls, and a bot that records requests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use amadeus_relay::application::errors::BotError;
use amadeus_relay::domain::entities::Request;
use amadeus_relay::domain::traits::{Bot, BotInfo};
use amadeus_relay::plugins::{
    Artifact, ArtifactLoader, Communication, Plugin, PluginCreateFn, PluginDeclaration,
    ResourceHandle, API_VERSION, PLUGIN_ABI_VERSION, PLUGIN_MAGIC,
};
use async_trait::async_trait;

/// What a registered stub path resolves to
#[derive(Clone, Copy)]
pub enum Entry {
    Plugin(PluginCreateFn),
    MissingSymbol,
    NullSymbol,
    WrongAbi(PluginCreateFn),
    Corrupt,
}

#[derive(Default)]
pub struct StubLoader {
    entries: Mutex<HashMap<PathBuf, Entry>>,
    failing_close: Mutex<HashSet<PathBuf>>,
    open: Arc<AtomicUsize>,
}

impl StubLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, path: impl Into<PathBuf>, entry: Entry) {
        self.entries.lock().unwrap().insert(path.into(), entry);
    }

    pub fn fail_close(&self, path: impl Into<PathBuf>) {
        self.failing_close.lock().unwrap().insert(path.into());
    }

    /// Resource handles opened and not yet closed
    pub fn open_resources(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

impl ArtifactLoader for StubLoader {
    fn open_resource(&self, path: &Path) -> io::Result<Box<dyn ResourceHandle>> {
        if !self.entries.lock().unwrap().contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubResource {
            open: self.open.clone(),
            fail: self.failing_close.lock().unwrap().contains(path),
        }))
    }

    fn open_artifact(&self, path: &Path) -> Result<Box<dyn Artifact>, String> {
        let entry = *self
            .entries
            .lock()
            .unwrap()
            .get(path)
            .ok_or_else(|| "not registered".to_string())?;

        let artifact = match entry {
            Entry::Corrupt => return Err("invalid ELF header".to_string()),
            Entry::MissingSymbol => StubArtifact {
                declaration: None,
                missing: true,
            },
            Entry::NullSymbol => StubArtifact {
                declaration: None,
                missing: false,
            },
            Entry::Plugin(create) => StubArtifact {
                declaration: Some(declaration(create, PLUGIN_ABI_VERSION)),
                missing: false,
            },
            Entry::WrongAbi(create) => StubArtifact {
                declaration: Some(declaration(create, PLUGIN_ABI_VERSION + 1)),
                missing: false,
            },
        };
        Ok(Box::new(artifact))
    }
}

fn declaration(create: PluginCreateFn, abi_version: u32) -> PluginDeclaration {
    PluginDeclaration {
        magic: PLUGIN_MAGIC,
        abi_version,
        api_version: API_VERSION,
        create,
    }
}

struct StubResource {
    open: Arc<AtomicUsize>,
    fail: bool,
}

impl ResourceHandle for StubResource {
    fn close(self: Box<Self>) -> io::Result<()> {
        self.open.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::Other, "close failed"));
        }
        Ok(())
    }
}

struct StubArtifact {
    declaration: Option<PluginDeclaration>,
    missing: bool,
}

impl Artifact for StubArtifact {
    fn lookup(&self, symbol: &str) -> Result<Option<&PluginDeclaration>, String> {
        if self.missing {
            return Err(format!("undefined symbol: {}", symbol));
        }
        Ok(self.declaration.as_ref())
    }
}

// Lifecycle calls happen synchronously on the thread calling the registry,
// so per-thread state keeps parallel tests apart.
thread_local! {
    static NEXT: RefCell<Option<(String, String)>> = RefCell::new(None);
    static LOG: RefCell<Vec<String>> = RefCell::new(Vec::new());
    static LAST_COMM: RefCell<Option<Communication>> = RefCell::new(None);
}

/// Name and version the next `create_recording` call on this thread reports
pub fn next_plugin(name: &str, version: &str) {
    NEXT.with(|n| *n.borrow_mut() = Some((name.to_string(), version.to_string())));
}

/// Lifecycle calls recorded on this thread, as `name:hook`
pub fn lifecycle() -> Vec<String> {
    LOG.with(|l| l.borrow().clone())
}

/// Plugin end of the channel most recently handed to a plugin on this thread
pub fn last_comm() -> Option<Communication> {
    LAST_COMM.with(|c| c.borrow().clone())
}

fn record(entry: String) {
    LOG.with(|l| l.borrow_mut().push(entry));
}

/// Lifecycle hook a test plugin panics in
#[derive(Clone, Copy, PartialEq)]
pub enum PanicAt {
    Never,
    Install,
    Uninstall,
    /// Any `set_communication` after the first
    Rewire,
}

pub struct RecordingPlugin {
    name: String,
    version: String,
    panic_at: PanicAt,
    wired: usize,
}

impl RecordingPlugin {
    fn new(name: &str, version: &str, panic_at: PanicAt) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            panic_at,
            wired: 0,
        }
    }
}

impl Plugin for RecordingPlugin {
    fn set_communication(&mut self, comm: Communication) {
        record(format!("{}:set_communication", self.name));
        self.wired += 1;
        if self.panic_at == PanicAt::Rewire && self.wired > 1 {
            panic!("rewire failed");
        }
        LAST_COMM.with(|c| *c.borrow_mut() = Some(comm));
    }

    fn install(&mut self) {
        record(format!("{}:install", self.name));
        if self.panic_at == PanicAt::Install {
            panic!("install failed");
        }
    }

    fn uninstall(&mut self) {
        record(format!("{}:uninstall", self.name));
        if self.panic_at == PanicAt::Uninstall {
            panic!("uninstall failed");
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }
}

pub fn create_recording() -> Box<dyn Plugin> {
    let (name, version) = NEXT
        .with(|n| n.borrow().clone())
        .unwrap_or_else(|| ("recording".to_string(), "0.1.0".to_string()));
    Box::new(RecordingPlugin::new(&name, &version, PanicAt::Never))
}

pub fn create_panicky() -> Box<dyn Plugin> {
    Box::new(RecordingPlugin::new("panicky", "0.0.1", PanicAt::Uninstall))
}

pub fn create_fragile() -> Box<dyn Plugin> {
    Box::new(RecordingPlugin::new("fragile", "0.0.1", PanicAt::Install))
}

pub fn create_touchy() -> Box<dyn Plugin> {
    Box::new(RecordingPlugin::new("touchy", "0.0.1", PanicAt::Rewire))
}

/// Bot that records every request instead of sending it
#[derive(Clone, Default)]
pub struct MockBot {
    sent: Arc<Mutex<Vec<Request>>>,
}

impl MockBot {
    pub fn sent(&self) -> Vec<Request> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Bot for MockBot {
    async fn send_request(&self, request: Request) -> Result<String, BotError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(request);
        Ok(sent.len().to_string())
    }

    fn peer(&self) -> Option<String> {
        Some("127.0.0.1:6700".to_string())
    }

    fn bot_info(&self) -> BotInfo {
        BotInfo {
            name: "mock".to_string(),
            endpoint: "test".to_string(),
        }
    }
}
