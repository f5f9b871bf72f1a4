//! Terminal reporting.

use trellis_core::Reporter;
use trellis_schema::{Artifact, ArtifactDownloadReport, Coordinate, DependencyRequest, DownloadStatus};

/// Prints progress to stderr, keeping stdout for results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn resolving(&self, _request: &DependencyRequest, _resolver: &str) {}

    fn resolved(&self, request: &DependencyRequest, resolved: &Coordinate, resolver: &str) {
        if request.coordinate == *resolved {
            eprintln!("  found {resolved} in {resolver}");
        } else {
            eprintln!("  found {resolved} for {} in {resolver}", request.coordinate);
        }
    }

    fn unresolved(&self, request: &DependencyRequest, attempts: &[String]) {
        eprintln!("  module not found: {}", request.coordinate);
        for line in attempts {
            eprintln!("  {line}");
        }
    }

    fn downloading(&self, _artifact: &Artifact) {}

    fn downloaded(&self, report: &ArtifactDownloadReport) {
        if report.status != DownloadStatus::NoOp {
            eprintln!("  {report}");
        }
    }

    fn published(&self, artifact: &Artifact, destination: &str) {
        eprintln!("  published {} to {destination}", artifact.name);
    }

    fn info(&self, msg: &str) {
        eprintln!("  {msg}");
    }

    fn warning(&self, msg: &str) {
        eprintln!("  warning: {msg}");
    }
}
