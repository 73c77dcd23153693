use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use time::OffsetDateTime;

use super::{FileStat, FsError, PluginFileSystem, normalise};

/// File system backed by a host directory opened as a capability.
///
/// All access goes through a `cap_std` [`Dir`], so symlinks and `..` cannot
/// reach outside the opened directory even if path normalisation missed
/// them.
#[derive(Debug)]
pub struct DirFileSystem {
    root: Utf8PathBuf,
    dir: Dir,
}

impl DirFileSystem {
    /// Opens `root` as the file-system root.
    ///
    /// # Errors
    ///
    /// Returns [`FsError`] when the directory cannot be opened.
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, FsError> {
        let root = path.into();
        let dir = Dir::open_ambient_dir(root.as_std_path(), ambient_authority())
            .map_err(|error| FsError::from_io(&root, error))?;
        Ok(Self { root, dir })
    }

    /// Host path of the root directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl PluginFileSystem for DirFileSystem {
    fn exists(&self, path: &Utf8Path) -> bool {
        normalise(path).is_ok_and(|relative| {
            self.dir
                .metadata(relative.as_std_path())
                .is_ok_and(|metadata| metadata.is_file())
        })
    }

    fn stat(&self, path: &Utf8Path) -> Result<FileStat, FsError> {
        let relative = normalise(path)?;
        let metadata = self
            .dir
            .metadata(relative.as_std_path())
            .map_err(|error| FsError::from_io(path, error))?;
        if !metadata.is_file() {
            return Err(FsError::NotFound {
                path: path.to_owned(),
            });
        }
        let modified = metadata
            .modified()
            .map_err(|error| FsError::from_io(path, error))?
            .into_std();
        Ok(FileStat {
            len: metadata.len(),
            modified: OffsetDateTime::from(modified),
        })
    }

    fn read(&self, path: &Utf8Path) -> Result<Vec<u8>, FsError> {
        let relative = normalise(path)?;
        self.dir
            .read(relative.as_std_path())
            .map_err(|error| FsError::from_io(path, error))
    }
}
