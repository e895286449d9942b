//! Purpose: Resolve where the native library is materialized on disk.
//! Exports: `TargetPath`, `resolve`, `temp_dir`.
//! Role: Keep every facade in the process agreeing on one location per `{directory, base name}`.
//! Invariants: Identical inputs resolve to identical paths (no randomness, no clock).
//! Invariants: The directory exists when `resolve` returns `Ok`.
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::platform::{LibraryExtension, LibraryIdentity};

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TargetPath {
    directory: PathBuf,
    base_name: String,
    extension: LibraryExtension,
}

impl TargetPath {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn extension(&self) -> LibraryExtension {
        self.extension
    }

    pub fn filename(&self) -> String {
        format!("{}.{}", self.base_name, self.extension)
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(self.filename())
    }

    /// Sidecar used to serialize extraction across processes.
    pub(crate) fn lock_path(&self) -> PathBuf {
        self.directory.join(format!(".{}.lock", self.filename()))
    }
}

/// The OS-configured temp directory (`TMPDIR`, `TEMP`, ...).
pub fn temp_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Computes the target for `identity`, creating `directory` when needed.
///
/// `directory` defaults to [`temp_dir`], `base_name` to the identity's platform base name.
pub fn resolve(
    identity: &LibraryIdentity,
    directory: Option<&Path>,
    base_name: Option<&str>,
) -> Result<TargetPath, Error> {
    let directory = directory.map(Path::to_path_buf).unwrap_or_else(temp_dir);
    let base_name = base_name.unwrap_or(&identity.platform_base_name);
    if base_name.is_empty() || base_name.contains(['/', '\\']) {
        return Err(Error::new(ErrorKind::InvalidPath)
            .with_message(format!("invalid library base name {base_name:?}"))
            .with_path(&directory));
    }

    ensure_directory(&directory)?;
    let directory = absolutize(directory)?;

    let target = TargetPath {
        directory,
        base_name: base_name.to_string(),
        extension: identity.platform_extension,
    };
    debug!(path = %target.path().display(), "resolved native library target");
    Ok(target)
}

fn ensure_directory(directory: &Path) -> Result<(), Error> {
    if directory.is_dir() {
        return Ok(());
    }
    if directory.exists() {
        return Err(Error::new(ErrorKind::InvalidPath)
            .with_message("library location is not a directory")
            .with_path(directory));
    }
    fs::create_dir_all(directory).map_err(|err| {
        Error::new(ErrorKind::InvalidPath)
            .with_message("library directory does not exist and cannot be created")
            .with_path(directory)
            .with_source(err)
    })
}

fn absolutize(directory: PathBuf) -> Result<PathBuf, Error> {
    if directory.is_absolute() {
        return Ok(directory);
    }
    let cwd = std::env::current_dir().map_err(|err| {
        Error::new(ErrorKind::InvalidPath)
            .with_message("failed to resolve current directory")
            .with_path(&directory)
            .with_source(err)
    })?;
    Ok(cwd.join(directory))
}
