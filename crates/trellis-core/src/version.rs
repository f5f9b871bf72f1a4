//! Version matchers: which found revisions satisfy an asked revision.
//!
//! A revision is *dynamic* when some matcher other than the exact one
//! claims it: `latest.release`, `1.2+`, `[1.0,2.0)`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use trellis_schema::{ModuleDescriptor, StatusSet};

use crate::latest::LatestStrategy;

pub trait VersionMatcher: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Whether `asked` denotes a set of revisions rather than one.
    fn is_dynamic(&self, asked: &str) -> bool;

    /// Whether the `found` revision satisfies `asked`, judging by the revision alone.
    fn accept(&self, asked: &str, found: &str) -> bool;

    /// Whether the descriptor of `found` is needed to decide.
    fn need_descriptor(&self, _asked: &str, _found: &str) -> bool {
        false
    }

    /// Descriptor-level acceptance, used when [`Self::need_descriptor`] is true.
    fn accept_descriptor(&self, asked: &str, found: &ModuleDescriptor) -> bool {
        self.accept(asked, &found.coordinate.revision)
    }

    /// Order the dynamic `asked` against a static `found`.
    ///
    /// `Greater` means any revision matching `asked` may be later than `found`.
    fn compare(&self, asked: &str, found: &str, strategy: &dyn LatestStrategy) -> Ordering;
}

/// Static revisions: string equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactVersionMatcher;

impl VersionMatcher for ExactVersionMatcher {
    fn name(&self) -> &str {
        "exact"
    }

    fn is_dynamic(&self, _asked: &str) -> bool {
        false
    }

    fn accept(&self, asked: &str, found: &str) -> bool {
        asked == found
    }

    fn compare(&self, asked: &str, found: &str, strategy: &dyn LatestStrategy) -> Ordering {
        strategy.compare_revisions(asked, found)
    }
}

const LATEST_PREFIX: &str = "latest.";

/// `latest.<status>`: the latest revision whose status is at least `<status>`.
#[derive(Debug, Clone, Default)]
pub struct LatestVersionMatcher {
    statuses: StatusSet,
}

impl LatestVersionMatcher {
    pub fn new(statuses: StatusSet) -> Self {
        Self { statuses }
    }
}

impl VersionMatcher for LatestVersionMatcher {
    fn name(&self) -> &str {
        "latest"
    }

    fn is_dynamic(&self, asked: &str) -> bool {
        asked.starts_with(LATEST_PREFIX)
    }

    fn accept(&self, _asked: &str, _found: &str) -> bool {
        true
    }

    // `latest.<least mature>` is satisfied by anything
    fn need_descriptor(&self, asked: &str, _found: &str) -> bool {
        self.statuses.least_mature() != Some(asked_status(asked))
    }

    fn accept_descriptor(&self, asked: &str, found: &ModuleDescriptor) -> bool {
        self.statuses.satisfies(&found.status, asked_status(asked))
    }

    fn compare(&self, _asked: &str, _found: &str, _strategy: &dyn LatestStrategy) -> Ordering {
        // Unknown until resolved; assume the dynamic one may be later
        Ordering::Equal
    }
}

fn asked_status(asked: &str) -> &str {
    asked.strip_prefix(LATEST_PREFIX).unwrap_or(asked)
}

/// `prefix+`: any revision starting with `prefix`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubRevisionMatcher;

impl VersionMatcher for SubRevisionMatcher {
    fn name(&self) -> &str {
        "sub-revision"
    }

    fn is_dynamic(&self, asked: &str) -> bool {
        asked.ends_with('+')
    }

    fn accept(&self, asked: &str, found: &str) -> bool {
        found.starts_with(sub_revision_prefix(asked))
    }

    fn compare(&self, asked: &str, found: &str, strategy: &dyn LatestStrategy) -> Ordering {
        let prefix = sub_revision_prefix(asked);
        if found.starts_with(prefix) {
            Ordering::Greater
        } else {
            strategy.compare_revisions(prefix, found)
        }
    }
}

fn sub_revision_prefix(asked: &str) -> &str {
    asked.strip_suffix('+').unwrap_or(asked)
}

const BOUND: &str = r"[^\s,\[\]()]+";

static FINITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^[\[\](]\s*({BOUND})\s*,\s*({BOUND})\s*[\]\[)]$"
    ))
    .expect("static regex")
});
static LOWER_INFINITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\(\s*,\s*({BOUND})\s*[\]\[)]$")).expect("static regex")
});
static UPPER_INFINITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^[\[\](]\s*({BOUND})\s*,\s*\)$")).expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    revision: String,
    inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Range {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Range {
    fn parse(asked: &str) -> Option<Self> {
        let lower_inclusive = asked.starts_with('[');
        let upper_inclusive = asked.ends_with(']');
        let bound = |revision: &str, inclusive| {
            Some(Bound {
                revision: revision.to_string(),
                inclusive,
            })
        };
        if let Some(caps) = FINITE.captures(asked) {
            return Some(Self {
                lower: bound(&caps[1], lower_inclusive),
                upper: bound(&caps[2], upper_inclusive),
            });
        }
        if let Some(caps) = LOWER_INFINITE.captures(asked) {
            return Some(Self {
                lower: None,
                upper: bound(&caps[1], upper_inclusive),
            });
        }
        UPPER_INFINITE.captures(asked).map(|caps| Self {
            lower: bound(&caps[1], lower_inclusive),
            upper: None,
        })
    }
}

/// Mathematical ranges: `[1.0,2.0]`, `[1.0,2.0[`, `]1.0,2.0)`, `(,2.0]`, `[1.0,)`.
///
/// Bounds are ordered with the configured latest strategy.
#[derive(Debug, Clone)]
pub struct VersionRangeMatcher {
    strategy: Arc<dyn LatestStrategy>,
}

impl VersionRangeMatcher {
    pub fn new(strategy: Arc<dyn LatestStrategy>) -> Self {
        Self { strategy }
    }
}

impl VersionMatcher for VersionRangeMatcher {
    fn name(&self) -> &str {
        "version-range"
    }

    fn is_dynamic(&self, asked: &str) -> bool {
        Range::parse(asked).is_some()
    }

    fn accept(&self, asked: &str, found: &str) -> bool {
        let Some(range) = Range::parse(asked) else {
            return false;
        };
        let above = range.lower.is_none_or(|b| {
            match self.strategy.compare_revisions(&b.revision, found) {
                Ordering::Less => true,
                Ordering::Equal => b.inclusive,
                Ordering::Greater => false,
            }
        });
        let below = range.upper.is_none_or(|b| {
            match self.strategy.compare_revisions(&b.revision, found) {
                Ordering::Greater => true,
                Ordering::Equal => b.inclusive,
                Ordering::Less => false,
            }
        });
        above && below
    }

    fn compare(&self, asked: &str, found: &str, strategy: &dyn LatestStrategy) -> Ordering {
        match Range::parse(asked).and_then(|r| r.upper) {
            None => Ordering::Greater,
            Some(upper) => match strategy.compare_revisions(&upper.revision, found) {
                Ordering::Equal => Ordering::Less,
                other => other,
            },
        }
    }
}

/// First matcher claiming the revision as dynamic decides, exact otherwise.
#[derive(Debug, Clone)]
pub struct ChainVersionMatcher {
    matchers: Vec<Arc<dyn VersionMatcher>>,
    exact: ExactVersionMatcher,
}

impl ChainVersionMatcher {
    pub fn new(matchers: Vec<Arc<dyn VersionMatcher>>) -> Self {
        Self {
            matchers,
            exact: ExactVersionMatcher,
        }
    }

    /// Latest, sub-revision and range matchers.
    pub fn standard(statuses: StatusSet, strategy: Arc<dyn LatestStrategy>) -> Self {
        Self::new(vec![
            Arc::new(LatestVersionMatcher::new(statuses)),
            Arc::new(SubRevisionMatcher),
            Arc::new(VersionRangeMatcher::new(strategy)),
        ])
    }

    fn matcher_for(&self, asked: &str) -> &dyn VersionMatcher {
        self.matchers
            .iter()
            .find(|m| m.is_dynamic(asked))
            .map_or(&self.exact as &dyn VersionMatcher, |m| m.as_ref())
    }
}

impl VersionMatcher for ChainVersionMatcher {
    fn name(&self) -> &str {
        "chain"
    }

    fn is_dynamic(&self, asked: &str) -> bool {
        self.matchers.iter().any(|m| m.is_dynamic(asked))
    }

    fn accept(&self, asked: &str, found: &str) -> bool {
        self.matcher_for(asked).accept(asked, found)
    }

    fn need_descriptor(&self, asked: &str, found: &str) -> bool {
        self.matcher_for(asked).need_descriptor(asked, found)
    }

    fn accept_descriptor(&self, asked: &str, found: &ModuleDescriptor) -> bool {
        self.matcher_for(asked).accept_descriptor(asked, found)
    }

    fn compare(&self, asked: &str, found: &str, strategy: &dyn LatestStrategy) -> Ordering {
        self.matcher_for(asked).compare(asked, found, strategy)
    }
}
