//! Crowd density detection service.
//!
//! The service lives in `crates/density-service`; this package ties the
//! workspace together and hosts the end-to-end tests under `tests/`.

pub use common;
pub use density_service;
