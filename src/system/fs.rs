//! File System Utilities

use filetime::FileTime;
use std::path::{Path, PathBuf};

use crate::system::Error;

/// Convenience wrapper for std::fs::remove_dir_all
pub fn remove_directory<P>(path: P) -> Result<(), Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Ok(());
    }
    std::fs::remove_dir_all(path).map_err(|e| Error::RemoveDirectory(path.display().to_string(), e))
}

/// Convenience wrapper for std::fs::create_dir_all
pub fn ensure_directory<P>(path: P) -> Result<(), Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if path.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| Error::CreateDirectory(path.display().to_string(), e))
}

/// Convenience wrapper for std::fs::read_to_string
pub fn read_file<P>(path: P) -> Result<String, Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| Error::ReadFile(path.display().to_string(), e))
}

/// Get the modified time for a file.
pub fn get_modified_time<P>(path: P) -> Result<FileTime, Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }

    path.metadata()
        .map(|x| FileTime::from_last_modification_time(&x))
        .map_err(|e| Error::ReadFile(path.display().to_string(), e))
}

pub trait PathExt {
    /// Wrapper for std::path::canonicalize, but maps the error to our own
    fn canonicalize2(&self) -> Result<PathBuf, Error>;

    /// Get the relative path from base to self, for display purposes.
    /// Base must be an absolute path.
    fn with_base<P>(&self, base: P) -> PathBuf
    where
        P: AsRef<Path>;
}

impl<P> PathExt for P
where
    P: AsRef<Path>,
{
    fn canonicalize2(&self) -> Result<PathBuf, Error> {
        dunce::canonicalize(self)
            .map_err(|x| Error::InvalidPath(self.as_ref().display().to_string(), x))
    }

    fn with_base<PBase>(&self, base: PBase) -> PathBuf
    where
        PBase: AsRef<Path>,
    {
        let path = self.as_ref();
        let base = base.as_ref();
        pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
    }
}
