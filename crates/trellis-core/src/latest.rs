//! Ranking strategies over candidate revisions.
//!
//! A strategy is a total order; selection sorts ascending and walks the
//! list from the end, so "latest" means "greatest under the strategy".

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Anything with a revision that a strategy can rank.
pub trait RevisionInfo {
    fn revision(&self) -> &str;
    fn last_modified(&self) -> Option<DateTime<Utc>>;
}

/// A bare revision string, with no known modification time.
#[derive(Debug, Clone, Copy)]
pub struct Revision<'a>(pub &'a str);

impl RevisionInfo for Revision<'_> {
    fn revision(&self) -> &str {
        self.0
    }

    fn last_modified(&self) -> Option<DateTime<Utc>> {
        None
    }
}

pub trait LatestStrategy: Send + Sync + fmt::Debug {
    /// Name used in settings (`latest-revision`, `latest-lexico`, `latest-time`).
    fn name(&self) -> &str;

    fn compare(&self, a: &dyn RevisionInfo, b: &dyn RevisionInfo) -> Ordering;
}

impl dyn LatestStrategy + '_ {
    /// Compare two bare revisions.
    pub fn compare_revisions(&self, a: &str, b: &str) -> Ordering {
        self.compare(&Revision(a), &Revision(b))
    }

    /// Sort ascending, least preferred first. The sort is stable.
    pub fn sort<T: RevisionInfo>(&self, items: &mut [T]) {
        items.sort_by(|a, b| self.compare(a, b));
    }

    /// Greatest entry, ignoring those modified after `as_of`.
    pub fn find_latest<'a, T: RevisionInfo>(
        &self,
        items: &'a [T],
        as_of: Option<DateTime<Utc>>,
    ) -> Option<&'a T> {
        items
            .iter()
            .filter(|item| match (as_of, item.last_modified()) {
                (Some(limit), Some(modified)) => modified <= limit,
                _ => true,
            })
            .fold(None, |best: Option<&T>, item| match best {
                Some(b) if self.compare(b, item) == Ordering::Greater => Some(b),
                _ => Some(item),
            })
    }
}

/// Strategy for a settings name, if known.
pub fn by_name(name: &str) -> Option<Arc<dyn LatestStrategy>> {
    match name {
        "latest-revision" | "default" => Some(Arc::new(LatestRevisionStrategy::default())),
        "latest-lexico" => Some(Arc::new(LatestLexicoStrategy)),
        "latest-time" => Some(Arc::new(LatestTimeStrategy)),
        _ => None,
    }
}

/// Version-aware order, in the spirit of PHP's `version_compare`.
///
/// `1.0-dev` < `1.0-rc1` < `1.0` and `1.10` > `1.9`. Words listed as
/// special meanings (`dev`, `rc`, `final` by default) rank by weight,
/// other words weigh 0.
#[derive(Debug, Clone)]
pub struct LatestRevisionStrategy {
    special_meanings: HashMap<String, i32>,
}

impl Default for LatestRevisionStrategy {
    fn default() -> Self {
        let special_meanings = [("dev", -1), ("rc", 1), ("final", 2)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self { special_meanings }
    }
}

impl LatestRevisionStrategy {
    /// Register or override the weight of a word.
    pub fn with_special_meaning(mut self, word: &str, weight: i32) -> Self {
        self.special_meanings.insert(word.to_lowercase(), weight);
        self
    }

    fn weight(&self, part: &str) -> Option<i32> {
        self.special_meanings.get(&part.to_lowercase()).copied()
    }

    /// Compare two revision strings.
    pub fn compare_str(&self, a: &str, b: &str) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let parts_a = split_revision(a);
        let parts_b = split_revision(b);

        for (pa, pb) in parts_a.iter().zip(&parts_b) {
            if pa == pb {
                continue;
            }
            let ordering = match (is_number(pa), is_number(pb)) {
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (true, true) => compare_numbers(pa, pb),
                (false, false) => match (self.weight(pa), self.weight(pb)) {
                    (None, None) => pa.cmp(pb),
                    (wa, wb) => wa.unwrap_or(0).cmp(&wb.unwrap_or(0)),
                },
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        // Extra trailing numbers make a revision greater, extra words smaller
        match parts_a.len().cmp(&parts_b.len()) {
            Ordering::Greater if is_number(&parts_a[parts_b.len()]) => Ordering::Greater,
            Ordering::Greater => Ordering::Less,
            Ordering::Less if is_number(&parts_b[parts_a.len()]) => Ordering::Less,
            Ordering::Less => Ordering::Greater,
            Ordering::Equal => Ordering::Equal,
        }
    }
}

impl LatestStrategy for LatestRevisionStrategy {
    fn name(&self) -> &str {
        "latest-revision"
    }

    fn compare(&self, a: &dyn RevisionInfo, b: &dyn RevisionInfo) -> Ordering {
        self.compare_str(a.revision(), b.revision())
    }
}

fn split_revision(revision: &str) -> Vec<String> {
    let mut normalized = String::with_capacity(revision.len() + 4);
    let mut previous: Option<char> = None;
    for ch in revision.chars() {
        if let Some(prev) = previous {
            let boundary = (prev.is_ascii_alphabetic() && ch.is_ascii_digit())
                || (prev.is_ascii_digit() && ch.is_ascii_alphabetic());
            if boundary {
                normalized.push('.');
            }
        }
        normalized.push(ch);
        previous = Some(ch);
    }
    normalized
        .split(['.', '_', '-', '+'])
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_number(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())
}

// Arbitrary length: compare without leading zeros, then by length, then lexically
fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Plain string order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestLexicoStrategy;

impl LatestStrategy for LatestLexicoStrategy {
    fn name(&self) -> &str {
        "latest-lexico"
    }

    fn compare(&self, a: &dyn RevisionInfo, b: &dyn RevisionInfo) -> Ordering {
        a.revision().cmp(b.revision())
    }
}

/// Order by modification time. Entries without one rank lowest.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestTimeStrategy;

impl LatestStrategy for LatestTimeStrategy {
    fn name(&self) -> &str {
        "latest-time"
    }

    fn compare(&self, a: &dyn RevisionInfo, b: &dyn RevisionInfo) -> Ordering {
        a.last_modified().cmp(&b.last_modified())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Timed(&'static str, i64);

    impl RevisionInfo for Timed {
        fn revision(&self) -> &str {
            self.0
        }
        fn last_modified(&self) -> Option<DateTime<Utc>> {
            Utc.timestamp_opt(self.1, 0).single()
        }
    }

    fn sorted(strategy: &dyn LatestStrategy, revisions: &[&'static str]) -> Vec<&'static str> {
        let mut items: Vec<Revision<'static>> = revisions.iter().map(|r| Revision(*r)).collect();
        strategy.sort(&mut items);
        items.into_iter().map(|r| r.0).collect()
    }

    #[test]
    fn test_latest_revision_order() {
        let strategy = LatestRevisionStrategy::default();
        let expected = [
            "0.2a", "0.2_b", "0.2rc1", "0.2-final", "1.0-dev1", "1.0-dev2", "1.0-alpha1",
            "1.0-alpha2", "1.0-beta1", "1.0-beta2", "1.0-gamma", "1.0-rc1", "1.0-rc2", "1.0",
            "1.0.1", "2.0", "2.0.0", "2.0.0.1",
        ];
        let mut shuffled = expected.to_vec();
        shuffled.reverse();
        shuffled.swap(2, 11);
        assert_eq!(sorted(&strategy, &shuffled), expected);
    }

    #[test]
    fn test_numbers_compare_numerically() {
        let strategy = LatestRevisionStrategy::default();
        assert_eq!(strategy.compare_str("1.10", "1.9"), Ordering::Greater);
        assert_eq!(strategy.compare_str("1.01", "1.1"), Ordering::Equal);
        assert_eq!(
            strategy.compare_str("1.99999999999999999999", "1.2"),
            Ordering::Greater
        );
    }

    #[test]
    fn test_custom_special_meaning() {
        let strategy = LatestRevisionStrategy::default().with_special_meaning("snapshot", -2);
        assert_eq!(
            strategy.compare_str("1.0-SNAPSHOT", "1.0-dev"),
            Ordering::Less
        );
    }

    #[test]
    fn test_lexico_and_time() {
        assert_eq!(sorted(&LatestLexicoStrategy, &["1.10", "1.9"]), ["1.10", "1.9"]);

        let items = [Timed("b", 200), Timed("a", 300), Timed("c", 100)];
        let strategy: &dyn LatestStrategy = &LatestTimeStrategy;
        assert_eq!(strategy.find_latest(&items, None).map(|t| t.0), Some("a"));
        let as_of = Utc.timestamp_opt(250, 0).single();
        assert_eq!(strategy.find_latest(&items, as_of).map(|t| t.0), Some("b"));
    }

    #[test]
    fn test_by_name() {
        assert_eq!(by_name("latest-time").unwrap().name(), "latest-time");
        assert!(by_name("nope").is_none());
    }
}
