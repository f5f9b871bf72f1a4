use anyhow::{Result, bail};
use trellis_core::{Engine, ResolveOptions};
use trellis_schema::{DependencyRequest, DownloadStatus};

/// Resolve a module, then download its artifacts into the cache.
pub fn download(engine: &Engine, coordinate: &str, resolver: Option<String>, confs: &[String]) -> Result<()> {
    let request = DependencyRequest::new(super::coordinate(coordinate)?).transitive(false);
    let options = ResolveOptions {
        resolver,
        ..ResolveOptions::default()
    };

    let report = engine.resolve(&request, &options)?;
    let Some(module) = report.root else {
        bail!("module not found: {}", request.coordinate);
    };

    let downloads = engine.download(&module, confs, &options)?;
    for outcome in &downloads.artifacts {
        if let (DownloadStatus::Successful | DownloadStatus::NoOp, Some(file)) = (outcome.status, &outcome.local_file) {
            println!("{}", file.display());
        }
    }
    if downloads.has_failures() {
        let failed: Vec<String> = downloads.failed().map(|r| r.artifact.to_string()).collect();
        bail!("failed to download: {}", failed.join(", "));
    }
    Ok(())
}
