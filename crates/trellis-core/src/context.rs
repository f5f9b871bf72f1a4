//! Per-resolve state threaded through every resolver call.
//!
//! There is no ambient "current resolver": each call receives the
//! context as `&mut` and pushes a frame through [`ResolveContext::scope`],
//! which pops it when the scope is dropped, including on early return.

use std::collections::{BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use trellis_schema::{Artifact, Coordinate, ResolvedModule};

use crate::conflict::{ConflictManager, StrictConflictManager};
use crate::error::ResolveError;

/// Cooperative cancellation flag, shareable across threads.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running operation to stop at its next check.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
struct Frame {
    resolver: String,
    artifact: Option<Artifact>,
}

/// One probed location, attributed to the innermost resolver at the time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub resolver: String,
    pub location: String,
}

#[derive(Debug)]
pub struct ResolveContext {
    frames: Vec<Frame>,
    resolved: HashMap<Coordinate, ResolvedModule>,
    blacklist: BTreeSet<Coordinate>,
    conflict_manager: Arc<dyn ConflictManager>,
    current_resolved: Option<ResolvedModule>,
    validate: bool,
    interrupt: Interrupt,
    attempts: Vec<Attempt>,
}

impl Default for ResolveContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolveContext {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            resolved: HashMap::new(),
            blacklist: BTreeSet::new(),
            conflict_manager: Arc::new(StrictConflictManager),
            current_resolved: None,
            validate: true,
            interrupt: Interrupt::new(),
            attempts: Vec::new(),
        }
    }

    pub fn with_conflict_manager(mut self, manager: Arc<dyn ConflictManager>) -> Self {
        self.conflict_manager = manager;
        self
    }

    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Push a frame for `resolver`; it is popped when the guard drops.
    pub fn scope(&mut self, resolver: &str) -> ContextScope<'_> {
        self.frames.push(Frame {
            resolver: resolver.to_string(),
            artifact: None,
        });
        ContextScope { ctx: self }
    }

    /// Innermost active resolver.
    pub fn current_resolver(&self) -> Option<&str> {
        self.frames.last().map(|f| f.resolver.as_str())
    }

    /// Artifact being worked on by the innermost resolver.
    pub fn current_artifact(&self) -> Option<&Artifact> {
        self.frames.last().and_then(|f| f.artifact.as_ref())
    }

    pub fn set_current_artifact(&mut self, artifact: Option<Artifact>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.artifact = artifact;
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Record a probed location for the failure report.
    pub fn record_attempt(&mut self, location: impl Into<String>) {
        let resolver = self
            .current_resolver()
            .unwrap_or("<none>")
            .to_string();
        self.attempts.push(Attempt {
            resolver,
            location: location.into(),
        });
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn attempts_for<'a>(&'a self, resolver: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.attempts
            .iter()
            .filter(move |a| a.resolver == resolver)
            .map(|a| a.location.as_str())
    }

    pub fn clear_attempts(&mut self) {
        self.attempts.clear();
    }

    /// One `"\t<resolver>: tried <location>"` line per attempt, grouped by resolver.
    pub fn failure_report(&self) -> Vec<String> {
        let mut order: Vec<&str> = Vec::new();
        for attempt in &self.attempts {
            if !order.contains(&attempt.resolver.as_str()) {
                order.push(&attempt.resolver);
            }
        }
        order
            .into_iter()
            .flat_map(|resolver| {
                self.attempts_for(resolver)
                    .map(move |location| format!("\t{resolver}: tried {location}"))
            })
            .collect()
    }

    /// # Errors
    ///
    /// Returns [`ResolveError::Interrupted`] once the interrupt was triggered.
    pub fn check_interrupted(&self) -> Result<(), ResolveError> {
        if self.interrupt.is_triggered() {
            Err(ResolveError::Interrupted)
        } else {
            Ok(())
        }
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn validate(&self) -> bool {
        self.validate
    }

    pub fn conflict_manager(&self) -> Arc<dyn ConflictManager> {
        Arc::clone(&self.conflict_manager)
    }

    /// Mark `coordinate` unusable for the rest of this resolution.
    pub fn blacklist(&mut self, coordinate: Coordinate) {
        self.blacklist.insert(coordinate);
    }

    pub fn is_blacklisted(&self, coordinate: &Coordinate) -> bool {
        self.blacklist.contains(coordinate)
    }

    /// Module found earlier in this resolution under `coordinate`.
    pub fn resolved(&self, coordinate: &Coordinate) -> Option<&ResolvedModule> {
        self.resolved.get(coordinate)
    }

    pub fn mark_resolved(&mut self, module: ResolvedModule) {
        self.resolved.insert(module.id().clone(), module);
    }

    /// Module accumulated so far by an enclosing chain.
    pub fn current_resolved(&self) -> Option<&ResolvedModule> {
        self.current_resolved.as_ref()
    }

    pub fn set_current_resolved(&mut self, module: Option<ResolvedModule>) {
        self.current_resolved = module;
    }
}

/// Guard returned by [`ResolveContext::scope`].
#[derive(Debug)]
pub struct ContextScope<'c> {
    ctx: &'c mut ResolveContext,
}

impl Deref for ContextScope<'_> {
    type Target = ResolveContext;

    fn deref(&self) -> &ResolveContext {
        self.ctx
    }
}

impl DerefMut for ContextScope<'_> {
    fn deref_mut(&mut self) -> &mut ResolveContext {
        self.ctx
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        self.ctx.frames.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(ctx: &mut ResolveContext, fail: bool) -> Result<(), ResolveError> {
        let mut ctx = ctx.scope("inner");
        ctx.record_attempt("/repo/inner.json");
        if fail {
            return Err(ResolveError::Interrupted);
        }
        Ok(())
    }

    #[test]
    fn test_scope_pops_on_error() {
        let mut ctx = ResolveContext::new();
        {
            let mut outer = ctx.scope("outer");
            outer.record_attempt("/repo/outer.json");
            assert!(probe(&mut outer, true).is_err());
            assert_eq!(outer.current_resolver(), Some("outer"));
            assert_eq!(outer.depth(), 1);
        }
        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.current_resolver(), None);

        let report = ctx.failure_report();
        assert_eq!(
            report,
            vec![
                "\touter: tried /repo/outer.json".to_string(),
                "\tinner: tried /repo/inner.json".to_string(),
            ]
        );
    }

    #[test]
    fn test_interrupt_shared() {
        let interrupt = Interrupt::new();
        let ctx = ResolveContext::new().with_interrupt(interrupt.clone());
        assert!(ctx.check_interrupted().is_ok());
        interrupt.trigger();
        assert!(ctx.check_interrupted().unwrap_err().is_interrupted());
    }

    #[test]
    fn test_blacklist() {
        let mut ctx = ResolveContext::new();
        let c = Coordinate::new("acme", "a", "2.0");
        assert!(!ctx.is_blacklisted(&c));
        ctx.blacklist(c.clone());
        assert!(ctx.is_blacklisted(&c));
    }
}
