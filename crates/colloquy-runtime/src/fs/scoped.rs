use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use super::{FileStat, FsError, PluginFileSystem, normalise};

/// View of another file system re-rooted under a fixed prefix.
#[derive(Clone)]
pub struct ScopedFileSystem {
    inner: Arc<dyn PluginFileSystem>,
    prefix: Utf8PathBuf,
}

impl ScopedFileSystem {
    /// Scopes `inner` to `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::AccessDenied`] if `prefix` itself escapes the
    /// inner root.
    pub fn new(
        inner: Arc<dyn PluginFileSystem>,
        prefix: impl AsRef<Utf8Path>,
    ) -> Result<Self, FsError> {
        let prefix = normalise(prefix.as_ref())?;
        Ok(Self { inner, prefix })
    }

    /// Prefix applied to every path.
    #[must_use]
    pub fn prefix(&self) -> &Utf8Path {
        &self.prefix
    }

    fn resolve(&self, path: &Utf8Path) -> Result<Utf8PathBuf, FsError> {
        Ok(self.prefix.join(normalise(path)?))
    }
}

impl std::fmt::Debug for ScopedFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedFileSystem")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl PluginFileSystem for ScopedFileSystem {
    fn exists(&self, path: &Utf8Path) -> bool {
        self.resolve(path)
            .is_ok_and(|resolved| self.inner.exists(&resolved))
    }

    fn stat(&self, path: &Utf8Path) -> Result<FileStat, FsError> {
        let resolved = self.resolve(path)?;
        self.inner.stat(&resolved).map_err(|error| rebase(error, path))
    }

    fn read(&self, path: &Utf8Path) -> Result<Vec<u8>, FsError> {
        let resolved = self.resolve(path)?;
        self.inner.read(&resolved).map_err(|error| rebase(error, path))
    }
}

// Errors report the caller's path, not the host-side prefix.
fn rebase(error: FsError, path: &Utf8Path) -> FsError {
    match error {
        FsError::NotFound { .. } => FsError::NotFound {
            path: path.to_owned(),
        },
        FsError::AccessDenied { .. } => FsError::AccessDenied {
            path: path.to_owned(),
        },
        FsError::Io { source, .. } => FsError::Io {
            path: path.to_owned(),
            source,
        },
    }
}
