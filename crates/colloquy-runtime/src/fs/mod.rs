//! Read-only file-system capabilities handed to plugins.
//!
//! Plugins never see host paths. They receive a [`PluginFileSystem`] whose
//! paths are relative, UTF-8 and confined to the plugin's own content.
//! [`ScopedFileSystem`] re-roots a shared file system under a prefix and
//! [`MountedFileSystem`] stitches several scoped views into the layout a
//! plugin expects (`views/` and `data/`).

mod dir;
mod memory;
mod mounted;
mod scoped;

use std::io;
use std::sync::Arc;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use thiserror::Error;
use time::OffsetDateTime;

pub use dir::DirFileSystem;
pub use memory::InMemoryFileSystem;
pub use mounted::MountedFileSystem;
pub use scoped::ScopedFileSystem;

/// Metadata returned by [`PluginFileSystem::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// File length in bytes.
    pub len: u64,
    /// Last write time.
    pub modified: OffsetDateTime,
}

/// Errors raised by file-system capabilities.
#[derive(Debug, Clone, Error)]
pub enum FsError {
    /// The path does not name a file.
    #[error("no such file: {path}")]
    NotFound {
        /// Requested path.
        path: Utf8PathBuf,
    },
    /// The path escapes the capability's root.
    #[error("access denied: {path}")]
    AccessDenied {
        /// Requested path.
        path: Utf8PathBuf,
    },
    /// The underlying storage failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// Requested path.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl FsError {
    pub(crate) fn from_io(path: &Utf8Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_owned(),
            },
            io::ErrorKind::PermissionDenied => Self::AccessDenied {
                path: path.to_owned(),
            },
            _ => Self::Io {
                path: path.to_owned(),
                source: Arc::new(source),
            },
        }
    }
}

/// Read-only file access for plugins and view serving.
///
/// Implementations must treat every path as relative to their own root and
/// reject paths that would leave it.
pub trait PluginFileSystem: Send + Sync {
    /// Reports whether `path` names an existing file.
    fn exists(&self, path: &Utf8Path) -> bool;

    /// Returns metadata for the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::NotFound`] for missing files and
    /// [`FsError::AccessDenied`] for paths outside the root.
    fn stat(&self, path: &Utf8Path) -> Result<FileStat, FsError>;

    /// Reads the whole file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::NotFound`] for missing files and
    /// [`FsError::AccessDenied`] for paths outside the root.
    fn read(&self, path: &Utf8Path) -> Result<Vec<u8>, FsError>;

    /// Reads the file at `path` as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Propagates [`PluginFileSystem::read`] failures and reports invalid
    /// UTF-8 as [`FsError::Io`].
    fn read_to_string(&self, path: &Utf8Path) -> Result<String, FsError> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|error| FsError::Io {
            path: path.to_owned(),
            source: Arc::new(io::Error::new(io::ErrorKind::InvalidData, error)),
        })
    }
}

/// Normalises a relative path, rejecting anything that could escape a root.
///
/// `.` segments are dropped; `..`, absolute paths and platform prefixes are
/// refused.
///
/// # Errors
///
/// Returns [`FsError::AccessDenied`] when the path is not a plain relative
/// path.
pub fn normalise(path: &Utf8Path) -> Result<Utf8PathBuf, FsError> {
    let mut normalised = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::Normal(segment) => normalised.push(segment),
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir | Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                return Err(FsError::AccessDenied {
                    path: path.to_owned(),
                });
            }
        }
    }
    Ok(normalised)
}

#[cfg(test)]
mod tests;
