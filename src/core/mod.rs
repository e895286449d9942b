// Bootstrap building blocks: naming, resolution, extraction, loading, backend binding.
pub mod backend;
pub mod error;
pub mod extract;
pub mod guard;
pub mod payload;
pub mod platform;
pub mod target;
