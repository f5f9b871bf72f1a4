//! Candidate selection: ranking, rejection and blacklist escalation.

use trellis_schema::{Coordinate, DependencyRequest, ResolvedModule};
use tracing::debug;

use crate::context::ResolveContext;
use crate::error::ResolveError;
use crate::latest::LatestStrategy;
use crate::locator::Candidate;
use crate::version::VersionMatcher;

/// Fetches and parses the descriptor of a candidate when the matcher needs it.
pub type DescriptorFetch<'f> =
    dyn FnMut(&Candidate, &mut ResolveContext) -> Result<Option<ResolvedModule>, ResolveError> + 'f;

/// The surviving candidate, with its module when it had to be parsed.
#[derive(Debug, Clone)]
pub struct Selected {
    pub candidate: Candidate,
    pub module: Option<ResolvedModule>,
}

pub struct CandidateSelector<'a> {
    pub resolver: &'a str,
    pub strategy: &'a dyn LatestStrategy,
    pub matcher: &'a dyn VersionMatcher,
    /// Revisions never offered, such as version control directories.
    pub ignored: &'a [String],
}

enum Verdict {
    Accept(Option<ResolvedModule>),
    Reject(String),
    Blacklisted(Coordinate),
}

impl CandidateSelector<'_> {
    /// Best candidate for `request`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns the conflict manager's error when every acceptable candidate
    /// is blacklisted, and propagates interruption.
    pub fn select(
        &self,
        request: &DependencyRequest,
        mut candidates: Vec<Candidate>,
        fetch: &mut DescriptorFetch<'_>,
        ctx: &mut ResolveContext,
    ) -> Result<Option<Selected>, ResolveError> {
        self.strategy.sort(&mut candidates);
        let mut rejected = Vec::new();
        let mut blacklisted = Vec::new();

        for candidate in candidates.into_iter().rev() {
            ctx.check_interrupted()?;
            match self.judge(request, &candidate, fetch, ctx)? {
                Verdict::Accept(module) => {
                    debug!("{}: selected {} for {}", self.resolver, candidate.revision, request.coordinate);
                    return Ok(Some(Selected { candidate, module }));
                }
                Verdict::Reject(reason) => {
                    debug!("{}: rejected {}: {reason}", self.resolver, candidate.resource.name);
                    rejected.push(format!("{} ({reason})", candidate.revision));
                }
                Verdict::Blacklisted(coordinate) => {
                    debug!("{}: blacklisted: {coordinate}", self.resolver);
                    rejected.push(format!("{} (blacklisted)", candidate.revision));
                    blacklisted.push(coordinate);
                }
            }
        }

        if !rejected.is_empty() {
            ctx.record_attempt(format!("rejected: {}", rejected.join(", ")));
        }
        if !blacklisted.is_empty() {
            return Err(ctx
                .conflict_manager()
                .handle_all_blacklisted_revisions(request, &blacklisted));
        }
        Ok(None)
    }

    fn judge(
        &self,
        request: &DependencyRequest,
        candidate: &Candidate,
        fetch: &mut DescriptorFetch<'_>,
        ctx: &mut ResolveContext,
    ) -> Result<Verdict, ResolveError> {
        let asked = &request.coordinate.revision;
        if self.ignored.iter().any(|name| name == &candidate.revision) {
            return Ok(Verdict::Reject("filtered".into()));
        }
        if let (Some(as_of), Some(modified)) = (request.as_of, candidate.resource.last_modified) {
            if modified > as_of {
                return Ok(Verdict::Reject(format!("unacceptable publication date: {modified}")));
            }
        }
        let found = candidate.coordinate(&request.coordinate);
        if ctx.is_blacklisted(&found) {
            return Ok(Verdict::Blacklisted(found));
        }
        if !self.matcher.accept(asked, &candidate.revision) {
            return Ok(Verdict::Reject(format!("{asked} does not accept it")));
        }

        let mut module = None;
        if self.matcher.need_descriptor(asked, &candidate.revision) {
            let fetched = match fetch(candidate, ctx) {
                Ok(fetched) => fetched,
                Err(e) if e.is_interrupted() => return Err(e),
                Err(e) => return Ok(Verdict::Reject(format!("impossible to get descriptor: {e}"))),
            };
            let Some(fetched) = fetched else {
                return Ok(Verdict::Reject("impossible to get descriptor".into()));
            };
            if fetched.is_default() {
                return Ok(Verdict::Reject("default descriptor".into()));
            }
            if !self.matcher.accept_descriptor(asked, &fetched.descriptor) {
                return Ok(Verdict::Reject(format!(
                    "descriptor not accepted by {asked} (status {})",
                    fetched.descriptor.status
                )));
            }
            module = Some(fetched);
        }

        if !candidate.resource.exists {
            return Ok(Verdict::Reject("resource not reachable".into()));
        }
        Ok(Verdict::Accept(module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latest::LatestRevisionStrategy;
    use crate::repository::{FileRepository, Repository, Resource};
    use crate::version::{ChainVersionMatcher, VersionRangeMatcher};
    use std::sync::Arc;
    use trellis_schema::{ModuleDescriptor, StatusSet};

    fn candidates(revisions: &[&str]) -> Vec<Candidate> {
        let repo: Arc<dyn Repository> = Arc::new(FileRepository::new());
        revisions
            .iter()
            .map(|r| {
                let mut resource = Resource::missing(format!("/repo/{r}/lib.jar"), true);
                resource.exists = true;
                Candidate::new(resource, *r, Arc::clone(&repo))
            })
            .collect()
    }

    fn no_fetch() -> impl FnMut(&Candidate, &mut ResolveContext) -> Result<Option<ResolvedModule>, ResolveError> {
        |_, _| panic!("descriptor should not be needed")
    }

    fn request(revision: &str) -> DependencyRequest {
        DependencyRequest::new(Coordinate::new("acme", "lib", revision))
    }

    #[test]
    fn test_range_selects_highest_in_range() {
        let strategy = LatestRevisionStrategy::default();
        let matcher = VersionRangeMatcher::new(Arc::new(LatestRevisionStrategy::default()));
        let selector = CandidateSelector {
            resolver: "test",
            strategy: &strategy,
            matcher: &matcher,
            ignored: &[],
        };
        let mut ctx = ResolveContext::new();

        let picked = selector
            .select(&request("[1.0,2.0)"), candidates(&["1.0", "2.0", "1.5"]), &mut no_fetch(), &mut ctx)
            .unwrap()
            .unwrap();
        assert_eq!(picked.candidate.revision, "1.5");

        let picked = selector
            .select(&request("[1.0,2.0)"), candidates(&["1.0", "2.0"]), &mut no_fetch(), &mut ctx)
            .unwrap()
            .unwrap();
        assert_eq!(picked.candidate.revision, "1.0");
    }

    #[test]
    fn test_blacklist_skips_then_escalates() {
        let strategy = LatestRevisionStrategy::default();
        let matcher = ChainVersionMatcher::standard(StatusSet::default(), Arc::new(LatestRevisionStrategy::default()));
        let selector = CandidateSelector {
            resolver: "test",
            strategy: &strategy,
            matcher: &matcher,
            ignored: &[],
        };
        let mut ctx = ResolveContext::new();
        ctx.blacklist(Coordinate::new("acme", "lib", "2.0"));

        let picked = selector
            .select(&request("latest.integration"), candidates(&["1.5", "2.0"]), &mut no_fetch(), &mut ctx)
            .unwrap()
            .unwrap();
        assert_eq!(picked.candidate.revision, "1.5");

        ctx.blacklist(Coordinate::new("acme", "lib", "1.5"));
        let err = selector
            .select(&request("latest.integration"), candidates(&["1.5", "2.0"]), &mut no_fetch(), &mut ctx)
            .unwrap_err();
        match err {
            ResolveError::UnsolvableConflict { blacklisted, .. } => {
                assert_eq!(blacklisted.len(), 2);
                assert_eq!(blacklisted[0].revision, "2.0");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_descriptor_status_and_default_rejected() {
        let strategy = LatestRevisionStrategy::default();
        let matcher = ChainVersionMatcher::standard(StatusSet::default(), Arc::new(LatestRevisionStrategy::default()));
        let selector = CandidateSelector {
            resolver: "test",
            strategy: &strategy,
            matcher: &matcher,
            ignored: &[],
        };
        let mut fetch = |c: &Candidate, _: &mut ResolveContext| {
            let coordinate = Coordinate::new("acme", "lib", c.revision.clone());
            let descriptor = match c.revision.as_str() {
                "3.0" => ModuleDescriptor::default_for(coordinate),
                "2.0" => ModuleDescriptor::new(coordinate, "integration"),
                _ => ModuleDescriptor::new(coordinate, "release"),
            };
            Ok::<_, ResolveError>(Some(ResolvedModule::new(descriptor, "test")))
        };
        let picked = selector
            .select(&request("latest.release"), candidates(&["1.0", "2.0", "3.0"]), &mut fetch, &mut ResolveContext::new())
            .unwrap()
            .unwrap();
        assert_eq!(picked.candidate.revision, "1.0");
        assert_eq!(picked.module.unwrap().descriptor.status, "release");
    }

    #[test]
    fn test_missing_resource_and_filter() {
        let strategy = LatestRevisionStrategy::default();
        let matcher = ChainVersionMatcher::standard(StatusSet::default(), Arc::new(LatestRevisionStrategy::default()));
        let ignored = vec!["CVS".to_string()];
        let selector = CandidateSelector {
            resolver: "test",
            strategy: &strategy,
            matcher: &matcher,
            ignored: &ignored,
        };
        let mut list = candidates(&["1.0", "2.0", "CVS"]);
        list[1].resource.exists = false;
        let picked = selector
            .select(&request("latest.integration"), list, &mut no_fetch(), &mut ResolveContext::new())
            .unwrap()
            .unwrap();
        assert_eq!(picked.candidate.revision, "1.0");
    }
}
