//! Purpose: Cross-platform master audio volume control backed by an embedded native library.
//! Exports: `api` (facade, configuration, errors); `core` for bootstrap internals.
//! Role: Library behind the `volctl` CLI; the embedded payload is materialized and loaded on
//! first construction of a `VolumeControl`.
//! Invariants: Library code never installs a tracing subscriber.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;

pub use api::{Error, ErrorKind, MAX_VOLUME, MIN_VOLUME, VolumeControl};
