//! Error taxonomy of the resolution core.
//!
//! "Not found" is never an error: resolvers return `Ok(None)`. Everything
//! below is a real failure that a chain may collect or a caller may report.

use std::io;

use thiserror::Error;
use trellis_schema::{ChecksumAlgorithm, Coordinate};

use crate::cache::CacheError;
use crate::descriptor::ParseError;
use crate::pattern::PatternError;
use crate::repository::RepositoryError;

/// Failures of resolution, acquisition and publication.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The descriptor's identity or status disagrees with the request.
    #[error("inconsistent module descriptor file found in '{location}': {}", .problems.join("; "))]
    InconsistentMetadata {
        /// Where the descriptor was read from.
        location: String,
        /// One entry per mismatch.
        problems: Vec<String>,
    },

    /// Downloaded bytes do not match the published checksum.
    #[error("invalid {algorithm}: expected={expected} computed={computed}")]
    ChecksumMismatch {
        /// Algorithm of the side-file used.
        algorithm: ChecksumAlgorithm,
        /// Value read from the side-file.
        expected: String,
        /// Value computed over the downloaded bytes.
        computed: String,
    },

    /// Network or filesystem failure while moving bytes.
    #[error("transfer of {location} failed: {source}")]
    Transfer {
        /// Resource being transferred.
        location: String,
        /// Underlying repository failure.
        #[source]
        source: RepositoryError,
    },

    /// Every remaining candidate is blacklisted for the ongoing resolution.
    #[error("unsolvable conflict for {request}: all candidates are blacklisted ({})", coordinates(.blacklisted))]
    UnsolvableConflict {
        /// The requested coordinate.
        request: Coordinate,
        /// Candidates rejected by the blacklist.
        blacklisted: Vec<Coordinate>,
    },

    /// The publish protocol was violated.
    #[error("{0}")]
    TransactionMisuse(String),

    /// Transactions are required but cannot be supported by this resolver.
    #[error("{resolver} does not support transaction. {reason}. Set transactional to 'auto' or 'false' or fix the problem.")]
    UnsupportedTransaction {
        /// Resolver name.
        resolver: String,
        /// Why transactions are unsupported.
        reason: String,
    },

    /// A dynamic revision reached a resolver that only handles exact ones.
    #[error("dynamic revisions are not handled by {resolver}: {coordinate}")]
    DynamicRevisionUnsupported {
        /// Resolver name.
        resolver: String,
        /// The dynamic coordinate.
        coordinate: Coordinate,
    },

    /// Several chain members failed.
    #[error("several problems occurred while resolving {request}:\n{}", messages(.errors))]
    Aggregate {
        /// The request that failed.
        request: String,
        /// Member failures, in chain order.
        errors: Vec<ResolveError>,
    },

    /// Cooperative cancellation was requested.
    #[error("operation interrupted")]
    Interrupted,

    /// The descriptor could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The local cache could not be read or written.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The repository failed outside of a transfer.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A configured pattern is malformed.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// Settings or composition are invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The resolver is in a state that forbids the operation.
    #[error("{0}")]
    IllegalState(String),

    /// Local filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ResolveError {
    /// Whether this is a cancellation rather than a failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Merge chain member failures: one is returned as is, several are aggregated.
    pub fn merge(request: impl ToString, mut errors: Vec<ResolveError>) -> Option<ResolveError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Aggregate {
                request: request.to_string(),
                errors,
            }),
        }
    }
}

fn coordinates(list: &[Coordinate]) -> String {
    list.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn messages(errors: &[ResolveError]) -> String {
    errors
        .iter()
        .map(|e| format!("\t{e}"))
        .collect::<Vec<_>>()
        .join("\n")
}
