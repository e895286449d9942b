//! Purpose: Materialize the embedded native payload as a file a platform loader can open.
//! Exports: `Placement`, `ReusePolicy`, `Extraction`, `Materialized`, `materialize`.
//! Role: Filesystem half of the bootstrap; the load guard decides when it runs.
//! Invariants: A loader never observes a half-written library; shared targets are only ever
//! populated by rename of a fully written sibling.
//! Invariants: Failure to delete an existing target is expected and never fatal.
//! Invariants: Per-domain placement always yields a path no other caller has been handed.
//! Invariants: A shared result keeps the extraction lock until it is dropped.
//! Notes: Shared placement trusts an undeletable existing file unless `ReusePolicy::VerifyDigest`.
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use getrandom::fill as fill_random;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind, is_benign_contention};
use crate::core::target::TargetPath;

const UNIQUE_NAME_ATTEMPTS: usize = 16;

/// Where the payload is written.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Placement {
    /// One file at the resolved target, shared by every instance in the process.
    #[default]
    Shared,
    /// A fresh uniquely-named file for each call.
    PerDomain,
}

/// What to do with an existing shared target that could not be deleted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReusePolicy {
    /// Assume it is a complete copy of the current payload.
    #[default]
    Trust,
    /// Reuse only if its SHA-256 matches the payload; otherwise extract a private copy.
    VerifyDigest,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Extraction {
    /// Fresh bytes were written to the shared target.
    Written,
    /// The existing shared target was kept as-is.
    Reused,
    /// A uniquely-named file was created.
    Unique,
}

/// A library file ready to be loaded.
///
/// For shared placement it carries the cross-process extraction lock; other processes cannot
/// replace the file until this value is dropped, so load it first.
#[derive(Debug)]
pub struct Materialized {
    pub path: PathBuf,
    pub extraction: Extraction,
    pub(crate) lock: Option<SidecarLock>,
}

impl Materialized {
    #[cfg(test)]
    pub(crate) fn unlocked(path: PathBuf, extraction: Extraction) -> Self {
        Self {
            path,
            extraction,
            lock: None,
        }
    }
}

pub fn materialize(
    payload: &[u8],
    target: &TargetPath,
    placement: Placement,
    policy: ReusePolicy,
) -> Result<Materialized, Error> {
    match placement {
        Placement::PerDomain => {
            let path = write_unique(payload, target)?;
            Ok(Materialized {
                path,
                extraction: Extraction::Unique,
                lock: None,
            })
        }
        Placement::Shared => {
            materialize_shared(payload, target, policy, |path| fs::remove_file(path))
        }
    }
}

fn materialize_shared<R>(
    payload: &[u8],
    target: &TargetPath,
    policy: ReusePolicy,
    remove: R,
) -> Result<Materialized, Error>
where
    R: FnOnce(&Path) -> io::Result<()>,
{
    let path = target.path();
    let lock = SidecarLock::acquire(&target.lock_path());

    match remove(&path) {
        Ok(()) => debug!(path = %path.display(), "removed previous native library"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => debug!(
            path = %path.display(),
            error = %err,
            "existing native library could not be removed; another instance likely holds it"
        ),
    }

    if !exists(&path)? {
        let extraction = write_into_place(payload, target)?;
        return Ok(Materialized {
            path,
            extraction,
            lock: Some(lock),
        });
    }

    let (path, extraction) = reuse_existing(payload, target, policy)?;
    Ok(Materialized {
        path,
        extraction,
        lock: Some(lock),
    })
}

fn reuse_existing(
    payload: &[u8],
    target: &TargetPath,
    policy: ReusePolicy,
) -> Result<(PathBuf, Extraction), Error> {
    let path = target.path();
    if policy == ReusePolicy::VerifyDigest && !digest_matches(&path, payload)? {
        warn!(
            path = %path.display(),
            "existing native library differs from the embedded payload; extracting a private copy"
        );
        return Ok((write_unique(payload, target)?, Extraction::Unique));
    }
    debug!(path = %path.display(), "reusing existing native library");
    Ok((path, Extraction::Reused))
}

/// Writes a staging sibling and renames it over the target.
fn write_into_place(payload: &[u8], target: &TargetPath) -> Result<Extraction, Error> {
    let path = target.path();
    let prefix = format!(".{}.", target.filename());
    let (file, staging) = create_unique(target.directory(), &prefix, ".tmp")?;
    if let Err(err) = write_all_synced(&file, payload, &staging) {
        drop(file);
        let _ = fs::remove_file(&staging);
        return Err(err);
    }
    drop(file);

    match fs::rename(&staging, &path) {
        Ok(()) => {
            debug!(path = %path.display(), bytes = payload.len(), "extracted native library");
            Ok(Extraction::Written)
        }
        Err(err) => {
            let _ = fs::remove_file(&staging);
            if is_benign_contention(&err) && exists(&path)? {
                debug!(
                    path = %path.display(),
                    error = %err,
                    "another instance placed the native library first; reusing it"
                );
                return Ok(Extraction::Reused);
            }
            Err(io_error(&path, "failed to move native library into place", err))
        }
    }
}

fn write_unique(payload: &[u8], target: &TargetPath) -> Result<PathBuf, Error> {
    let suffix = format!(".{}", target.extension());
    let (file, path) = create_unique(target.directory(), target.base_name(), &suffix)?;
    let locked = LockedFile::exclusive(file, &path)?;
    if let Err(err) = write_all_synced(locked.file(), payload, &path) {
        drop(locked);
        let _ = fs::remove_file(&path);
        return Err(err);
    }
    debug!(path = %path.display(), bytes = payload.len(), "extracted private native library copy");
    Ok(path)
}

fn create_unique(directory: &Path, prefix: &str, suffix: &str) -> Result<(File, PathBuf), Error> {
    for _ in 0..UNIQUE_NAME_ATTEMPTS {
        let path = directory.join(format!("{prefix}{}{suffix}", random_token()?));
        match OpenOptions::new().read(true).write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(io_error(&path, "failed to create native library file", err)),
        }
    }
    Err(Error::new(ErrorKind::Io)
        .with_message("could not allocate a unique native library file name")
        .with_path(directory))
}

fn random_token() -> Result<String, Error> {
    let mut bytes = [0u8; 8];
    fill_random(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Io).with_message(format!("failed to generate random file name: {err}"))
    })?;
    Ok(bytes.iter().map(|byte| format!("{byte:02x}")).collect())
}

fn write_all_synced(mut file: &File, payload: &[u8], path: &Path) -> Result<(), Error> {
    file.write_all(payload)
        .map_err(|err| io_error(path, "failed to write native library", err))?;
    file.sync_all()
        .map_err(|err| io_error(path, "failed to sync native library", err))
}

fn digest_matches(path: &Path, payload: &[u8]) -> Result<bool, Error> {
    let mut existing = Vec::with_capacity(payload.len());
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut existing))
        .map_err(|err| io_error(path, "failed to read existing native library", err))?;
    Ok(Sha256::digest(&existing) == Sha256::digest(payload))
}

fn exists(path: &Path) -> Result<bool, Error> {
    path.try_exists()
        .map_err(|err| io_error(path, "failed to inspect native library path", err))
}

fn io_error(path: &Path, message: &str, err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(message)
        .with_path(path)
        .with_source(err)
}

/// Exclusive advisory lock held for as long as the value lives.
#[derive(Debug)]
struct LockedFile {
    file: File,
}

impl LockedFile {
    fn exclusive(file: File, path: &Path) -> Result<Self, Error> {
        file.lock_exclusive()
            .map_err(|err| io_error(path, "failed to lock native library file", err))?;
        Ok(Self { file })
    }

    fn file(&self) -> &File {
        &self.file
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Cross-process extraction lock on `.<filename>.lock`.
///
/// Absent when the sidecar cannot be opened (read-only directory); extraction then relies on
/// rename atomicity alone.
#[derive(Debug)]
pub(crate) struct SidecarLock {
    _held: Option<LockedFile>,
}

impl SidecarLock {
    fn acquire(path: &Path) -> Self {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path);
        let locked = file
            .map_err(|err| io_error(path, "failed to open extraction lock", err))
            .and_then(|file| LockedFile::exclusive(file, path));
        match locked {
            Ok(locked) => Self {
                _held: Some(locked),
            },
            Err(err) => {
                warn!(error = %err, "extracting without cross-process lock");
                Self { _held: None }
            }
        }
    }
}
