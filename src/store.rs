use std::cell::RefCell;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Read/write access to source text by path.
pub trait TextStore {
    /// Fails with `Error::NotFound` for a missing path, `Error::Io` otherwise.
    fn read(&self, path: &str) -> Result<String>;

    /// Creates intermediate directories as needed.
    fn write(&self, path: &str, text: &str) -> Result<()>;
}

/// Filesystem-backed store. Relative paths resolve against `root` if set.
#[derive(Debug, Clone, Default)]
pub struct FsStore {
    root: Option<PathBuf>,
}

impl FsStore {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match self.root {
            Some(ref root) => root.join(path),
            None => PathBuf::from(path),
        }
    }
}

impl TextStore for FsStore {
    fn read(&self, path: &str) -> Result<String> {
        let full = self.resolve(path);
        std::fs::read_to_string(&full).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(full),
            _ => Error::Io(e),
        })
    }

    fn write(&self, path: &str, text: &str) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, text)?;
        debug!(path = %full.display(), bytes = text.len(), "wrote file");
        Ok(())
    }
}

/// In-memory store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, text: &str) -> Self {
        self.files
            .borrow_mut()
            .insert(path.to_string(), text.to_string());
        self
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.files.borrow().get(path).cloned()
    }
}

impl TextStore for MemoryStore {
    fn read(&self, path: &str) -> Result<String> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(Path::new(path).to_path_buf()))
    }

    fn write(&self, path: &str, text: &str) -> Result<()> {
        self.files
            .borrow_mut()
            .insert(path.to_string(), text.to_string());
        Ok(())
    }
}
