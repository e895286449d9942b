//! Purpose: `VolumeControl`, the typed facade over the native master-volume backend.
//! Exports: `VolumeControl`, `VolumeControlBuilder`, `VolumeControlOptions`.
//! Role: Runs the bootstrap (resolve -> guard -> extract -> load -> bind) at construction.
//! Invariants: Construction either yields a ready facade or one fatal `Error`; no partial state.
//! Invariants: `set_volume` rejects values outside `MIN_VOLUME..=MAX_VOLUME` without touching the OS.
//! Invariants: Volume is never cached; every call round-trips to the backend.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::core::backend::{Backend, MAX_VOLUME, MIN_VOLUME, NativeBackend};
use crate::core::error::{Error, ErrorKind};
use crate::core::extract::{self, Placement, ReusePolicy};
use crate::core::guard::{IsolationDomain, LoadGuard};
use crate::core::payload::PayloadStore;
use crate::core::platform::LibraryIdentity;
use crate::core::target;

/// Construction-time configuration. Unset fields take platform defaults.
#[derive(Clone, Debug, Default)]
pub struct VolumeControlOptions {
    /// Directory the library is extracted to; defaults to the OS temp directory.
    pub directory: Option<PathBuf>,
    /// File name without extension; defaults to the platform base name (`libvolctl`/`volctl`).
    pub base_name: Option<String>,
    /// Give this instance its own uniquely-named library file.
    pub multi_domain: bool,
    pub reuse: ReusePolicy,
    /// Loader domain; defaults to [`IsolationDomain::PROCESS`], or a fresh domain per build
    /// when `multi_domain` is set.
    pub domain: Option<IsolationDomain>,
}

/// Master audio volume access and control.
///
/// The backend is a native library embedded in this crate. It is written out to
/// `directory/base_name.<so|dll>` and loaded once per [`IsolationDomain`]; further
/// instances targeting the same file share the loaded library.
///
/// With `multi_domain` set, the instance extracts a private copy instead. Those files have
/// unpredictable names and are not removed by this process.
pub struct VolumeControl {
    backend: Arc<dyn Backend>,
    library_path: Option<PathBuf>,
    domain: Option<IsolationDomain>,
}

impl VolumeControl {
    pub fn builder() -> VolumeControlBuilder {
        VolumeControlBuilder::default()
    }

    /// Default location and name, shared library file.
    pub fn new() -> Result<Self, Error> {
        Self::builder().build()
    }

    pub fn in_directory(directory: impl Into<PathBuf>) -> Result<Self, Error> {
        Self::builder().directory(directory).build()
    }

    pub fn with_base_name(base_name: impl Into<String>) -> Result<Self, Error> {
        Self::builder().base_name(base_name).build()
    }

    /// Defaults, but with a private library file in a fresh isolation domain.
    pub fn new_with_domain_support() -> Result<Self, Error> {
        Self::builder().multi_domain(true).build()
    }

    /// Wraps an already-available backend; no native bootstrap runs.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            library_path: None,
            domain: None,
        }
    }

    /// Current master volume in `0..=100`.
    pub fn get_volume(&self) -> Result<i32, Error> {
        self.backend.get_volume()
    }

    /// Sets the master volume; `value` must be in `0..=100`.
    pub fn set_volume(&self, value: i32) -> Result<(), Error> {
        if value < MIN_VOLUME {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("Value must be positive, was {value}")));
        }
        if value > MAX_VOLUME {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("Value must be less than 100, was {value}")));
        }
        self.backend.set_volume(value)
    }

    /// The library file backing this instance, when it was bootstrapped natively.
    pub fn library_path(&self) -> Option<&Path> {
        self.library_path.as_deref()
    }

    pub fn domain(&self) -> Option<IsolationDomain> {
        self.domain
    }
}

impl fmt::Debug for VolumeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeControl")
            .field("library_path", &self.library_path)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct VolumeControlBuilder {
    options: VolumeControlOptions,
    guard: Option<Arc<LoadGuard>>,
    payloads: Option<PayloadStore>,
}

impl VolumeControlBuilder {
    pub fn options(mut self, options: VolumeControlOptions) -> Self {
        self.options = options;
        self
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.options.directory = Some(directory.into());
        self
    }

    pub fn base_name(mut self, base_name: impl Into<String>) -> Self {
        self.options.base_name = Some(base_name.into());
        self
    }

    pub fn multi_domain(mut self, enabled: bool) -> Self {
        self.options.multi_domain = enabled;
        self
    }

    pub fn reuse(mut self, policy: ReusePolicy) -> Self {
        self.options.reuse = policy;
        self
    }

    pub fn domain(mut self, domain: IsolationDomain) -> Self {
        self.options.domain = Some(domain);
        self
    }

    /// Guard to serialize loading through; defaults to [`LoadGuard::process`].
    pub fn guard(mut self, guard: Arc<LoadGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Resource store to take the payload from; defaults to [`PayloadStore::bundled`].
    pub fn payloads(mut self, payloads: PayloadStore) -> Self {
        self.payloads = Some(payloads);
        self
    }

    pub fn build(self) -> Result<VolumeControl, Error> {
        let Self {
            options,
            guard,
            payloads,
        } = self;
        let guard = guard.unwrap_or_else(LoadGuard::process);
        let payloads = payloads.unwrap_or_else(PayloadStore::bundled);

        let identity = LibraryIdentity::host();
        let target = target::resolve(
            &identity,
            options.directory.as_deref(),
            options.base_name.as_deref(),
        )?;
        let (placement, domain) = if options.multi_domain {
            (
                Placement::PerDomain,
                options.domain.unwrap_or_else(IsolationDomain::new),
            )
        } else {
            (
                Placement::Shared,
                options.domain.unwrap_or(IsolationDomain::PROCESS),
            )
        };

        let library = guard.ensure_loaded(domain, &target, placement, || {
            let payload = payloads.lookup(&identity.resource_name())?;
            extract::materialize(payload, &target, placement, options.reuse)
        })?;
        let library_path = library.path().to_path_buf();
        let backend = NativeBackend::bind(library)?;
        debug!(path = %library_path.display(), %domain, "volume control ready");

        Ok(VolumeControl {
            backend: Arc::new(backend),
            library_path: Some(library_path),
            domain: Some(domain),
        })
    }
}
