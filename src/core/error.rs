//! Purpose: Error taxonomy shared by the bootstrap pipeline and the volume facade.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`, `is_benign_contention`.
//! Role: Single structured error carried from resolver, extraction, load guard and backend.
//! Invariants: Every fatal failure maps to exactly one `ErrorKind`.
//! Invariants: Benign contention (file busy/held by another instance) is classified here and
//! never surfaced as an `Error`.
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Target directory is missing and cannot be created, or is not a directory.
    InvalidPath,
    /// The embedded native payload is absent from the build.
    PayloadMissing,
    /// Unrecoverable filesystem failure while materializing the payload.
    Io,
    /// The platform loader rejected the library, or a required symbol is missing.
    NativeLoad,
    /// The native backend reported a failure.
    Backend,
    /// A caller-supplied value is out of range.
    InvalidArgument,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::InvalidArgument => 2,
        ErrorKind::InvalidPath => 3,
        ErrorKind::PayloadMissing => 4,
        ErrorKind::Io => 5,
        ErrorKind::NativeLoad => 6,
        ErrorKind::Backend => 7,
    }
}

/// Reports whether `err` means another live holder has the file open or mapped.
pub fn is_benign_contention(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    let Some(code) = err.raw_os_error() else {
        return false;
    };
    os_code_is_contention(code)
}

// EACCES/EPERM come from sticky directories such as /tmp, which refuse to unlink or rename
// over another user's copy. Callers only treat them as contention when the target exists, and
// then reuse that copy.
#[cfg(unix)]
fn os_code_is_contention(code: i32) -> bool {
    code == libc::EBUSY || code == libc::ETXTBSY || code == libc::EACCES || code == libc::EPERM
}

#[cfg(windows)]
fn os_code_is_contention(code: i32) -> bool {
    const ERROR_ACCESS_DENIED: i32 = 5;
    const ERROR_SHARING_VIOLATION: i32 = 32;
    const ERROR_LOCK_VIOLATION: i32 = 33;
    const ERROR_USER_MAPPED_FILE: i32 = 1224;
    matches!(
        code,
        ERROR_ACCESS_DENIED | ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION | ERROR_USER_MAPPED_FILE
    )
}
