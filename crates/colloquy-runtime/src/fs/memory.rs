use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::RwLock;
use time::OffsetDateTime;

use super::{FileStat, FsError, PluginFileSystem, normalise};

#[derive(Debug, Clone)]
struct MemoryFile {
    data: Vec<u8>,
    modified: OffsetDateTime,
}

/// File system held entirely in memory.
///
/// Useful for embedding content in a binary and for tests that need
/// deterministic modification times.
#[derive(Debug, Default)]
pub struct InMemoryFileSystem {
    files: RwLock<BTreeMap<Utf8PathBuf, MemoryFile>>,
}

impl InMemoryFileSystem {
    /// Creates an empty file system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, returning `self` for chaining.
    ///
    /// Paths that fail [`normalise`] are ignored.
    #[must_use]
    pub fn with_file(
        self,
        path: impl AsRef<Utf8Path>,
        data: impl Into<Vec<u8>>,
        modified: OffsetDateTime,
    ) -> Self {
        self.insert(path, data, modified);
        self
    }

    /// Adds or replaces a file. Returns `false` when the path is rejected.
    pub fn insert(
        &self,
        path: impl AsRef<Utf8Path>,
        data: impl Into<Vec<u8>>,
        modified: OffsetDateTime,
    ) -> bool {
        let Ok(key) = normalise(path.as_ref()) else {
            return false;
        };
        self.files.write().insert(
            key,
            MemoryFile {
                data: data.into(),
                modified,
            },
        );
        true
    }

    /// Removes a file, reporting whether it existed.
    pub fn remove(&self, path: impl AsRef<Utf8Path>) -> bool {
        normalise(path.as_ref())
            .map(|key| self.files.write().remove(&key).is_some())
            .unwrap_or(false)
    }

    fn lookup<T>(
        &self,
        path: &Utf8Path,
        project: impl FnOnce(&MemoryFile) -> T,
    ) -> Result<T, FsError> {
        let key = normalise(path)?;
        let files = self.files.read();
        files
            .get(&key)
            .map(project)
            .ok_or_else(|| FsError::NotFound {
                path: path.to_owned(),
            })
    }
}

impl PluginFileSystem for InMemoryFileSystem {
    fn exists(&self, path: &Utf8Path) -> bool {
        self.lookup(path, |_| ()).is_ok()
    }

    fn stat(&self, path: &Utf8Path) -> Result<FileStat, FsError> {
        self.lookup(path, |file| FileStat {
            len: file.data.len() as u64,
            modified: file.modified,
        })
    }

    fn read(&self, path: &Utf8Path) -> Result<Vec<u8>, FsError> {
        self.lookup(path, |file| file.data.clone())
    }
}
