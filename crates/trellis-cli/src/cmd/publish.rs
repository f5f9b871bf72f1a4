use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use trellis_core::Engine;
use trellis_schema::{Artifact, Coordinate};

/// Publish local files as artifacts of `coordinate`.
pub fn publish(engine: &Engine, coordinate: &str, resolver: &str, specs: &[String], overwrite: bool) -> Result<()> {
    let module = super::coordinate(coordinate)?;
    let artifacts = specs
        .iter()
        .map(|spec| parse_artifact(&module, spec))
        .collect::<Result<Vec<_>>>()?;
    for (_, path) in &artifacts {
        if !path.is_file() {
            bail!("no such file: {}", path.display());
        }
    }

    let destinations = engine
        .publish(resolver, &module, &artifacts, overwrite)
        .with_context(|| format!("failed to publish {module}"))?;
    for destination in destinations {
        println!("{destination}");
    }
    Ok(())
}

/// `name:type[:ext]=path`
fn parse_artifact(module: &Coordinate, spec: &str) -> Result<(Artifact, PathBuf)> {
    let Some((id, path)) = spec.split_once('=') else {
        bail!("invalid artifact '{spec}', expected name:type[:ext]=path");
    };
    let parts: Vec<&str> = id.split(':').collect();
    let (name, kind, ext) = match parts.as_slice() {
        [name, kind] => (*name, *kind, *kind),
        [name, kind, ext] => (*name, *kind, *ext),
        _ => bail!("invalid artifact '{spec}', expected name:type[:ext]=path"),
    };
    if name.is_empty() || kind.is_empty() || path.is_empty() {
        bail!("invalid artifact '{spec}', expected name:type[:ext]=path");
    }
    Ok((Artifact::new(module.clone(), name, kind, ext), PathBuf::from(path)))
}
