//! Purpose: Serialize extract-then-load so each library is loaded once per isolation domain.
//! Exports: `IsolationDomain`, `LoadGuard`, `LoadedLibrary`.
//! Role: Owns the process-wide mutual exclusion for the native bootstrap and the registry of
//! loaded libraries.
//! Invariants: All `ensure_loaded` calls on one guard are totally ordered by its mutex.
//! Invariants: A shared `(domain, target)` pair is extracted and loaded at most once; repeats
//! return the same handle without touching the filesystem. Per-domain requests always get a
//! fresh file.
//! Invariants: A library file loaded by one domain is never handed to another domain.
//! Notes: Lock acquisition has no timeout; a stuck filesystem blocks every caller.
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use libloading::Library;
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::extract::{Materialized, Placement};
use crate::core::target::TargetPath;

/// A loader context in which a given library file may be loaded at most once.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct IsolationDomain(u64);

impl IsolationDomain {
    /// The domain every facade uses unless told otherwise.
    pub const PROCESS: IsolationDomain = IsolationDomain(0);

    /// Allocates a domain distinct from every other domain in this process.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IsolationDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "domain#{}", self.0)
    }
}

pub struct LoadedLibrary {
    path: PathBuf,
    domain: IsolationDomain,
    library: Library,
}

impl LoadedLibrary {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn domain(&self) -> IsolationDomain {
        self.domain
    }

    pub(crate) fn library(&self) -> &Library {
        &self.library
    }
}

impl fmt::Debug for LoadedLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedLibrary")
            .field("path", &self.path)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct GuardState {
    loaded: HashMap<(IsolationDomain, PathBuf), Arc<LoadedLibrary>>,
    owners: HashMap<PathBuf, IsolationDomain>,
}

#[derive(Default)]
pub struct LoadGuard {
    state: Mutex<GuardState>,
}

impl LoadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// The guard shared by every facade that is not given one explicitly.
    pub fn process() -> Arc<LoadGuard> {
        static PROCESS: OnceLock<Arc<LoadGuard>> = OnceLock::new();
        Arc::clone(PROCESS.get_or_init(|| Arc::new(LoadGuard::new())))
    }

    /// Loads the library for `target` in `domain`, running `materialize` only on first use.
    ///
    /// `Placement::PerDomain` requests are never served from the registry: each one
    /// materializes and loads its own file.
    pub fn ensure_loaded<F>(
        &self,
        domain: IsolationDomain,
        target: &TargetPath,
        placement: Placement,
        materialize: F,
    ) -> Result<Arc<LoadedLibrary>, Error>
    where
        F: FnOnce() -> Result<Materialized, Error>,
    {
        let mut state = self.lock();
        let target_path = target.path();
        if placement == Placement::Shared {
            if let Some(loaded) = state.loaded.get(&(domain, target_path.clone())) {
                debug!(%domain, path = %loaded.path.display(), "native library already loaded");
                return Ok(Arc::clone(loaded));
            }
            check_owner(&state, domain, &target_path)?;
        }

        // The extraction lock stays held until the loader has mapped the file, so no other
        // process can replace it in between.
        let Materialized {
            path,
            extraction,
            lock,
        } = materialize()?;
        check_owner(&state, domain, &path)?;
        let library = open_library(&path)?;
        drop(lock);
        debug!(%domain, path = %path.display(), ?extraction, "loaded native library");

        let key = match placement {
            Placement::Shared => (domain, target_path),
            Placement::PerDomain => (domain, path.clone()),
        };
        let loaded = Arc::new(LoadedLibrary {
            path,
            domain,
            library,
        });
        state.owners.insert(loaded.path.clone(), domain);
        state.loaded.insert(key, Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn is_loaded(&self, domain: IsolationDomain, target: &TargetPath) -> bool {
        self.lock().loaded.contains_key(&(domain, target.path()))
    }

    /// Number of distinct library files this guard has loaded.
    pub fn loaded_files(&self) -> usize {
        self.lock().owners.len()
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        // State is mutated only after a successful load; poisoning leaves it consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_owner(state: &GuardState, domain: IsolationDomain, path: &Path) -> Result<(), Error> {
    match state.owners.get(path) {
        Some(owner) if *owner != domain => Err(Error::new(ErrorKind::NativeLoad)
            .with_message(format!(
                "native library already loaded in {owner}; {domain} needs its own copy"
            ))
            .with_path(path)),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn open_library(path: &Path) -> Result<Library, Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};
    // SAFETY: the payload's initializers have no preconditions; RTLD_NOW surfaces unresolved
    // symbols here instead of at first call.
    let library = unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) };
    library.map(Library::from).map_err(|err| load_error(path, err))
}

#[cfg(windows)]
fn open_library(path: &Path) -> Result<Library, Error> {
    // SAFETY: the payload's DllMain performs no work.
    let library = unsafe { Library::new(path) };
    library.map_err(|err| load_error(path, err))
}

fn load_error(path: &Path, err: libloading::Error) -> Error {
    Error::new(ErrorKind::NativeLoad)
        .with_message("platform loader rejected native library")
        .with_path(path)
        .with_source(err)
}
