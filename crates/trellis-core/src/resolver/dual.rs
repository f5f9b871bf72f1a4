//! Metadata from one resolver, artifacts from another.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};
use trellis_schema::{Artifact, ArtifactOrigin, Coordinate, DependencyRequest, DownloadReport, ResolvedModule};

use super::{DependencyResolver, ResolverLookup, members};
use crate::acquire::DownloadOptions;
use crate::context::ResolveContext;
use crate::error::ResolveError;
use crate::pattern::TokenValues;

#[derive(Debug, Clone)]
pub struct DualResolverBuilder {
    name: String,
    metadata: Option<String>,
    artifact: Option<String>,
    allow_missing_descriptor: bool,
}

impl DualResolverBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: None,
            artifact: None,
            allow_missing_descriptor: true,
        }
    }

    pub fn metadata(mut self, resolver: impl Into<String>) -> Self {
        self.metadata = Some(resolver.into());
        self
    }

    pub fn artifact(mut self, resolver: impl Into<String>) -> Self {
        self.artifact = Some(resolver.into());
        self
    }

    /// Let the artifact resolver answer when no descriptor exists.
    pub fn allow_missing_descriptor(mut self, allow: bool) -> Self {
        self.allow_missing_descriptor = allow;
        self
    }

    pub fn member_names(&self) -> Vec<String> {
        self.metadata.iter().chain(&self.artifact).cloned().collect()
    }

    /// # Errors
    ///
    /// Returns [`ResolveError::Configuration`] when a delegate is missing or unknown.
    pub fn finalize(self, lookup: &dyn ResolverLookup) -> Result<DualResolver, ResolveError> {
        let (Some(metadata), Some(artifact)) = (&self.metadata, &self.artifact) else {
            return Err(ResolveError::Configuration(format!(
                "{}: exactly two resolvers must be added: metadata and artifact",
                self.name
            )));
        };
        let mut found = members(&self.name, &[metadata.clone(), artifact.clone()], lookup)?;
        let artifact = found.pop();
        let metadata = found.pop();
        let (Some(metadata), Some(artifact)) = (metadata, artifact) else {
            return Err(ResolveError::IllegalState(format!("{}: delegates lost", self.name)));
        };
        Ok(DualResolver {
            name: self.name,
            metadata,
            artifact,
            allow_missing_descriptor: self.allow_missing_descriptor,
        })
    }
}

#[derive(Debug)]
pub struct DualResolver {
    name: String,
    metadata: Arc<dyn DependencyResolver>,
    artifact: Arc<dyn DependencyResolver>,
    allow_missing_descriptor: bool,
}

impl DualResolver {
    pub fn builder(name: impl Into<String>) -> DualResolverBuilder {
        DualResolverBuilder::new(name)
    }

    pub fn metadata_resolver(&self) -> &Arc<dyn DependencyResolver> {
        &self.metadata
    }

    pub fn artifact_resolver(&self) -> &Arc<dyn DependencyResolver> {
        &self.artifact
    }
}

impl DependencyResolver for DualResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_dependency(
        &self,
        request: &DependencyRequest,
        ctx: &mut ResolveContext,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        let mut ctx = ctx.scope(&self.name);
        let incoming = ctx.current_resolved().cloned();
        let found = self.metadata.get_dependency(request, &mut ctx)?;
        if found == incoming {
            ctx.check_interrupted()?;
            if self.allow_missing_descriptor {
                debug!("{}: no metadata for {}, asking {}", self.name, request.coordinate, self.artifact.name());
                return self.artifact.get_dependency(request, &mut ctx);
            }
            return Ok(found);
        }
        Ok(found.map(|module| module.with_artifact_resolver(&self.name)))
    }

    fn download(
        &self,
        artifacts: &[Artifact],
        options: DownloadOptions,
        ctx: &mut ResolveContext,
    ) -> Result<DownloadReport, ResolveError> {
        self.artifact.download(artifacts, options, ctx)
    }

    fn locate(&self, artifact: &Artifact, ctx: &mut ResolveContext) -> Result<Option<ArtifactOrigin>, ResolveError> {
        if artifact.is_descriptor() {
            self.metadata.locate(artifact, ctx)
        } else {
            self.artifact.locate(artifact, ctx)
        }
    }

    fn publish(&self, artifact: &Artifact, source: &Path, overwrite: bool) -> Result<String, ResolveError> {
        if artifact.is_descriptor() {
            self.metadata.publish(artifact, source, overwrite)
        } else {
            self.artifact.publish(artifact, source, overwrite)
        }
    }

    fn begin_publish_transaction(&self, module: &Coordinate, overwrite: bool) -> Result<(), ResolveError> {
        self.metadata.begin_publish_transaction(module, overwrite)?;
        if let Err(e) = self.artifact.begin_publish_transaction(module, overwrite) {
            if let Err(abort) = self.metadata.abort_publish_transaction() {
                warn!("{}: abort of {} failed: {abort}", self.name, self.metadata.name());
            }
            return Err(e);
        }
        Ok(())
    }

    fn commit_publish_transaction(&self) -> Result<(), ResolveError> {
        self.metadata.commit_publish_transaction()?;
        self.artifact.commit_publish_transaction()
    }

    fn abort_publish_transaction(&self) -> Result<(), ResolveError> {
        let metadata = self.metadata.abort_publish_transaction();
        self.artifact.abort_publish_transaction()?;
        metadata
    }

    fn list_tokens(&self, token: &str, known: &TokenValues) -> Result<BTreeSet<String>, ResolveError> {
        let mut all = self.metadata.list_tokens(token, known)?;
        all.extend(self.artifact.list_tokens(token, known)?);
        Ok(all)
    }
}
