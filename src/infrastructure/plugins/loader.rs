//! Plugin loader - Opens plugin shared libraries with libloading

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::plugins::handle::{Artifact, ArtifactLoader, ResourceHandle};
use crate::plugins::trait_def::PluginDeclaration;

/// Loads plugins from `.so` / `.dylib` / `.dll` files
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }

    /// List plugin libraries in a directory, sorted by path.
    /// Hidden files are skipped.
    pub fn discover(dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let mut found = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() || !is_dynamic_lib(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    continue;
                }
            }
            found.push(path);
        }

        found.sort();
        Ok(found)
    }
}

fn is_dynamic_lib(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => {
            let ext = ext.to_ascii_lowercase();
            ext == "so" || ext == "dylib" || ext == "dll"
        }
        None => false,
    }
}

impl ArtifactLoader for NativeLoader {
    fn open_resource(&self, path: &Path) -> io::Result<Box<dyn ResourceHandle>> {
        let file = File::open(path)?;
        Ok(Box::new(FileResource { file }))
    }

    fn open_artifact(&self, path: &Path) -> Result<Box<dyn Artifact>, String> {
        // Running a library's initialisers is inherently unsafe; plugins are trusted.
        let library = unsafe { Library::new(path) }.map_err(|e| e.to_string())?;
        Ok(Box::new(NativeArtifact { library }))
    }
}

/// Open file kept alongside a loaded library
struct FileResource {
    file: File,
}

impl ResourceHandle for FileResource {
    fn close(self: Box<Self>) -> io::Result<()> {
        // std reports nothing on close; the descriptor is released here.
        drop(self.file);
        Ok(())
    }
}

struct NativeArtifact {
    library: Library,
}

impl Artifact for NativeArtifact {
    fn lookup(&self, symbol: &str) -> Result<Option<&PluginDeclaration>, String> {
        let decl: Symbol<*const PluginDeclaration> =
            unsafe { self.library.get(symbol.as_bytes()) }.map_err(|e| e.to_string())?;
        // The declaration is a static inside the library, valid while `self` is.
        Ok(unsafe { (*decl).as_ref() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_dynamic_lib() {
        assert!(is_dynamic_lib(Path::new("libecho.so")));
        assert!(is_dynamic_lib(Path::new("echo.DLL")));
        assert!(is_dynamic_lib(Path::new("libecho.dylib")));
        assert!(!is_dynamic_lib(Path::new("plugin.toml")));
        assert!(!is_dynamic_lib(Path::new("noext")));
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["libb.so", "liba.so", ".hidden.so", "readme.md"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.so")).unwrap();

        let found = NativeLoader::discover(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["liba.so", "libb.so"]);
    }

    #[test]
    fn test_open_artifact_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libgarbage.so");
        std::fs::write(&path, b"definitely not an ELF file").unwrap();

        assert!(NativeLoader::new().open_artifact(&path).is_err());
    }
}
