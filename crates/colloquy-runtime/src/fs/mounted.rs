use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use super::{FileStat, FsError, PluginFileSystem, normalise};

/// Routes paths to child file systems by their leading directory.
///
/// A path `views/index.html` is served by the file system mounted at
/// `views` as `index.html`. Paths outside every mount are denied.
#[derive(Clone, Default)]
pub struct MountedFileSystem {
    mounts: Vec<(Utf8PathBuf, Arc<dyn PluginFileSystem>)>,
}

impl MountedFileSystem {
    /// Creates a file system with no mounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts `fs` at `point`. Later mounts shadow earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::AccessDenied`] when `point` is not a plain
    /// relative path.
    pub fn mount(
        mut self,
        point: impl AsRef<Utf8Path>,
        fs: Arc<dyn PluginFileSystem>,
    ) -> Result<Self, FsError> {
        let point = normalise(point.as_ref())?;
        self.mounts.insert(0, (point, fs));
        Ok(self)
    }

    fn route(&self, path: &Utf8Path) -> Result<(&dyn PluginFileSystem, Utf8PathBuf), FsError> {
        let normalised = normalise(path)?;
        self.mounts
            .iter()
            .find_map(|(point, fs)| {
                normalised
                    .strip_prefix(point)
                    .ok()
                    .map(|rest| (fs.as_ref(), rest.to_owned()))
            })
            .ok_or_else(|| FsError::AccessDenied {
                path: path.to_owned(),
            })
    }
}

impl std::fmt::Debug for MountedFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let points: Vec<&Utf8Path> = self.mounts.iter().map(|(point, _)| point.as_path()).collect();
        f.debug_struct("MountedFileSystem")
            .field("mounts", &points)
            .finish()
    }
}

impl PluginFileSystem for MountedFileSystem {
    fn exists(&self, path: &Utf8Path) -> bool {
        self.route(path).is_ok_and(|(fs, rest)| fs.exists(&rest))
    }

    fn stat(&self, path: &Utf8Path) -> Result<FileStat, FsError> {
        let (fs, rest) = self.route(path)?;
        fs.stat(&rest)
    }

    fn read(&self, path: &Utf8Path) -> Result<Vec<u8>, FsError> {
        let (fs, rest) = self.route(path)?;
        fs.read(&rest)
    }
}
