//! Conflict manager hook.
//!
//! Global conflict resolution is out of scope; the core only needs the
//! callback fired when every candidate of a request has been blacklisted.

use std::fmt;

use trellis_schema::{Coordinate, DependencyRequest};

use crate::error::ResolveError;

pub trait ConflictManager: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// All candidates for `request` are blacklisted.
    ///
    /// The returned error terminates resolution of the request.
    fn handle_all_blacklisted_revisions(
        &self,
        request: &DependencyRequest,
        blacklisted: &[Coordinate],
    ) -> ResolveError;
}

/// Reports an unsolvable conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictConflictManager;

impl ConflictManager for StrictConflictManager {
    fn name(&self) -> &str {
        "strict"
    }

    fn handle_all_blacklisted_revisions(
        &self,
        request: &DependencyRequest,
        blacklisted: &[Coordinate],
    ) -> ResolveError {
        ResolveError::UnsolvableConflict {
            request: request.coordinate.clone(),
            blacklisted: blacklisted.to_vec(),
        }
    }
}
