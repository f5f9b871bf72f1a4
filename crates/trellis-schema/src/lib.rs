//! Shared data model for trellis.
//!
//! Everything here is plain data: coordinates, artifacts, descriptors and the
//! reports produced by resolution and acquisition. No I/O happens in this crate.

/// Artifacts published by modules.
pub mod artifact;
/// Module coordinates (organisation, name, revision).
pub mod coordinate;
/// Module descriptors.
pub mod descriptor;
/// Checksum algorithms and values.
pub mod hash;
/// Resolution and acquisition reports.
pub mod report;
/// Dependency requests.
pub mod request;
/// Resolved modules.
pub mod resolved;
/// Module statuses.
pub mod status;

// Re-exports
pub use artifact::*;
pub use coordinate::*;
pub use descriptor::*;
pub use hash::*;
pub use report::*;
pub use request::*;
pub use resolved::*;
pub use status::*;
