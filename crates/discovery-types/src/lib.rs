//! discovery-types: model types shared by the discovery client and tools.
//!
//! Members are registered into groups addressed by hierarchical paths
//! (`/service/workers`). Every registration carries a lease; the
//! discovery tier drops members whose lease elapses without renewal.
//!
//! The types here are plain values. Validation lives in [`validate`] and
//! runs before any request leaves the process.

pub mod options;
pub mod types;
pub mod validate;

pub use options::*;
pub use types::*;
pub use validate::ValidationError;
