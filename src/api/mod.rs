//! Purpose: Define the public Rust API boundary for volctl.
//! Exports: The volume facade plus the bootstrap types callers configure it with.
//! Role: Public, additive-only surface; hides internal module layout.
//! Invariants: This module is the only public path to bootstrap primitives.

mod control;

pub use crate::core::backend::{Backend, MAX_VOLUME, MIN_VOLUME, NativeBackend};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::extract::{Extraction, Materialized, Placement, ReusePolicy, materialize};
pub use crate::core::guard::{IsolationDomain, LoadGuard, LoadedLibrary};
pub use crate::core::payload::PayloadStore;
pub use crate::core::platform::{
    LibraryExtension, LibraryIdentity, Platform, default_lib_file_name, default_lib_name,
    is_windows, substring_after_last, substring_before_last,
};
pub use crate::core::target::{TargetPath, resolve, temp_dir};
pub use control::{VolumeControl, VolumeControlBuilder, VolumeControlOptions};
