use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use trellis_core::{Engine, ResolveOptions};
use trellis_schema::DependencyRequest;

/// Resolve one coordinate and print what was found.
pub fn resolve(
    engine: &Engine,
    coordinate: &str,
    resolver: Option<String>,
    transitive: bool,
    date: Option<DateTime<Utc>>,
    changing: bool,
) -> Result<()> {
    let mut request = DependencyRequest::new(super::coordinate(coordinate)?)
        .transitive(transitive)
        .changing(changing);
    if let Some(date) = date {
        request = request.as_of(date);
    }
    let options = ResolveOptions {
        resolver,
        ..ResolveOptions::default()
    };

    let report = engine.resolve(&request, &options)?;
    if let Some(root) = &report.root {
        println!("{}  ({}, {})", root.id(), root.descriptor.status, root.resolver);
    }
    for module in &report.dependencies {
        println!("  {}  ({}, {})", module.id(), module.descriptor.status, module.resolver);
    }

    if !report.unresolved.is_empty() {
        let missing: Vec<String> = report.unresolved.iter().map(|r| r.coordinate.to_string()).collect();
        bail!("unresolved: {}", missing.join(", "));
    }
    Ok(())
}
