//! Reporter trait for dependency injection
//!
//! This trait allows the engine to report resolution and download progress
//! without being coupled to a specific terminal or GUI implementation.

use trellis_schema::{Artifact, ArtifactDownloadReport, Coordinate, DependencyRequest};

pub trait Reporter: Send + Sync {
    /// A request is about to be resolved by `resolver`.
    fn resolving(&self, request: &DependencyRequest, resolver: &str);

    /// A request was resolved to `resolved`.
    fn resolved(&self, request: &DependencyRequest, resolved: &Coordinate, resolver: &str);

    /// No resolver could satisfy `request`. `attempts` lists what was tried.
    fn unresolved(&self, request: &DependencyRequest, attempts: &[String]);

    /// An artifact transfer is starting.
    fn downloading(&self, artifact: &Artifact);

    /// An artifact acquisition finished, successfully or not.
    fn downloaded(&self, report: &ArtifactDownloadReport);

    /// An artifact was published.
    fn published(&self, artifact: &Artifact, destination: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn resolving(&self, request: &DependencyRequest, resolver: &str) {
        (**self).resolving(request, resolver);
    }
    fn resolved(&self, request: &DependencyRequest, resolved: &Coordinate, resolver: &str) {
        (**self).resolved(request, resolved, resolver);
    }
    fn unresolved(&self, request: &DependencyRequest, attempts: &[String]) {
        (**self).unresolved(request, attempts);
    }
    fn downloading(&self, artifact: &Artifact) {
        (**self).downloading(artifact);
    }
    fn downloaded(&self, report: &ArtifactDownloadReport) {
        (**self).downloaded(report);
    }
    fn published(&self, artifact: &Artifact, destination: &str) {
        (**self).published(artifact, destination);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// A no-op reporter for silent operations (e.g., library use, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn resolving(&self, _: &DependencyRequest, _: &str) {}
    fn resolved(&self, _: &DependencyRequest, _: &Coordinate, _: &str) {}
    fn unresolved(&self, _: &DependencyRequest, _: &[String]) {}
    fn downloading(&self, _: &Artifact) {}
    fn downloaded(&self, _: &ArtifactDownloadReport) {}
    fn published(&self, _: &Artifact, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
}
