use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::{Artifact, ArtifactOrigin};

/// Details recorded for an artifact no resolver could locate.
pub const MISSING_ARTIFACT: &str = "missing artifact";

/// Result kind of one artifact download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Bytes were transferred and committed.
    Successful,
    /// The artifact was already available; nothing was transferred.
    NoOp,
    /// The artifact could not be acquired.
    Failed,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Successful => "successful",
            Self::NoOp => "no-op",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of acquiring one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDownloadReport {
    /// The artifact requested.
    pub artifact: Artifact,
    /// What happened.
    pub status: DownloadStatus,
    /// Size of the local file in bytes.
    pub size: u64,
    /// Time spent acquiring.
    pub elapsed: Duration,
    /// Where the bytes came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ArtifactOrigin>,
    /// Local file holding the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_file: Option<PathBuf>,
    /// Failure details, kept for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ArtifactDownloadReport {
    /// A report in the failed state, to be refined by the caller.
    pub fn new(artifact: Artifact) -> Self {
        Self {
            artifact,
            status: DownloadStatus::Failed,
            size: 0,
            elapsed: Duration::ZERO,
            origin: None,
            local_file: None,
            details: None,
        }
    }

    /// A failed report with details.
    pub fn failed(artifact: Artifact, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::new(artifact)
        }
    }

    /// Whether the artifact is usable after this download.
    pub fn is_ok(&self) -> bool {
        self.status != DownloadStatus::Failed
    }
}

impl fmt::Display for ArtifactDownloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status, self.artifact)?;
        if self.status == DownloadStatus::Successful {
            write!(f, " ({} bytes, {}ms)", self.size, self.elapsed.as_millis())?;
        }
        if let Some(details) = &self.details {
            write!(f, ": {details}")?;
        }
        Ok(())
    }
}

/// Outcomes of a batch of artifact downloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReport {
    /// One report per requested artifact, in request order.
    pub artifacts: Vec<ArtifactDownloadReport>,
}

impl DownloadReport {
    /// Append a report.
    pub fn push(&mut self, report: ArtifactDownloadReport) {
        self.artifacts.push(report);
    }

    /// Report for `artifact`, if it was requested.
    pub fn report_for(&self, artifact: &Artifact) -> Option<&ArtifactDownloadReport> {
        self.artifacts.iter().find(|r| &r.artifact == artifact)
    }

    /// Reports that ended in failure.
    pub fn failed(&self) -> impl Iterator<Item = &ArtifactDownloadReport> {
        self.artifacts.iter().filter(|r| !r.is_ok())
    }

    /// Whether any artifact failed.
    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    /// Replace the report for the same artifact, or append it.
    pub fn upsert(&mut self, report: ArtifactDownloadReport) {
        match self
            .artifacts
            .iter_mut()
            .find(|r| r.artifact == report.artifact)
        {
            Some(existing) => *existing = report,
            None => self.artifacts.push(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Coordinate;

    fn jar(name: &str) -> Artifact {
        Artifact::new(Coordinate::new("acme", "mod", "1.0"), name, "jar", "jar")
    }

    #[test]
    fn test_upsert_replaces_failed_report() {
        let mut report = DownloadReport::default();
        report.push(ArtifactDownloadReport::failed(jar("a"), MISSING_ARTIFACT));
        report.push(ArtifactDownloadReport::failed(jar("b"), MISSING_ARTIFACT));
        assert_eq!(report.failed().count(), 2);

        let mut ok = ArtifactDownloadReport::new(jar("a"));
        ok.status = DownloadStatus::NoOp;
        report.upsert(ok);

        assert_eq!(report.artifacts.len(), 2);
        assert_eq!(report.failed().count(), 1);
        assert!(report.report_for(&jar("a")).unwrap().is_ok());
    }
}
