//! Two-stage killmail filter pipeline
//!
//! A filter is a pure predicate over a killmail, immutable after
//! construction. The pipeline keeps two ordered lists:
//! - level 1: cheap classification filters (NPC, solo, awox, security zone)
//! - level 2: value and entity filters (thresholds, id membership)
//!
//! Level 1 runs in full, in insertion order, before any level-2 filter; the
//! first reject short-circuits everything after it. Holds no mutable state
//! after construction, so a shared pipeline is safe to evaluate from any
//! number of callers.
//!
//! ## Module Organization
//!
//! - `level1` - Classification filters
//! - `level2` - Value and entity filters

pub mod level1;
pub mod level2;

use crate::killmail::Killmail;

/// Predicate over a killmail record
pub trait KillmailFilter: Send + Sync {
    /// Returns true if the killmail passes this filter
    fn accept(&self, killmail: &Killmail) -> bool;
}

/// Include/exclude classification mode for entity and value filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    Include,
    Exclude,
}

impl FilterMode {
    /// Apply the mode to a raw match result
    pub(crate) fn apply(self, matched: bool) -> bool {
        match self {
            FilterMode::Include => matched,
            FilterMode::Exclude => !matched,
        }
    }
}

/// Ordered two-stage filter evaluator
#[derive(Default)]
pub struct FilterPipeline {
    level1: Vec<Box<dyn KillmailFilter>>,
    level2: Vec<Box<dyn KillmailFilter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a level-1 (classification) filter
    pub fn add_level1(&mut self, filter: impl KillmailFilter + 'static) -> &mut Self {
        self.level1.push(Box::new(filter));
        self
    }

    /// Append a level-2 (value/entity) filter
    pub fn add_level2(&mut self, filter: impl KillmailFilter + 'static) -> &mut Self {
        self.level2.push(Box::new(filter));
        self
    }

    /// Evaluate the killmail against both stages.
    ///
    /// Returns true only if every filter across both stages accepts;
    /// vacuously true when both stages are empty.
    pub fn evaluate(&self, killmail: &Killmail) -> bool {
        for filter in &self.level1 {
            if !filter.accept(killmail) {
                return false;
            }
        }
        for filter in &self.level2 {
            if !filter.accept(killmail) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Spy filter that records how often it was evaluated
    pub struct SpyFilter {
        pub calls: Arc<AtomicUsize>,
        pub verdict: bool,
    }

    impl SpyFilter {
        pub fn new(verdict: bool) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: calls.clone(),
                    verdict,
                },
                calls,
            )
        }
    }

    impl KillmailFilter for SpyFilter {
        fn accept(&self, _killmail: &Killmail) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict
        }
    }

    /// Minimal killmail for filter tests
    pub fn test_killmail() -> Killmail {
        serde_json::from_str(
            r#"{
                "killmail_id": 1,
                "hash": "h",
                "esi": {
                    "killmail_time": "2026-08-25T10:00:00Z",
                    "solar_system_id": 30000142,
                    "victim": {"ship_type_id": 587}
                },
                "zkb": {}
            }"#,
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{test_killmail, SpyFilter};
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_empty_pipeline_accepts_everything() {
        let pipeline = FilterPipeline::new();
        assert!(pipeline.evaluate(&test_killmail()));
    }

    #[test]
    fn test_level1_reject_short_circuits_level2() {
        // A level-1 reject must prevent any level-2 evaluation
        let (rejecting, level1_calls) = SpyFilter::new(false);
        let (spy, level2_calls) = SpyFilter::new(true);

        let mut pipeline = FilterPipeline::new();
        pipeline.add_level1(rejecting);
        pipeline.add_level2(spy);

        assert!(!pipeline.evaluate(&test_killmail()));
        assert_eq!(level1_calls.load(Ordering::SeqCst), 1);
        assert_eq!(level2_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_level1_reject_short_circuits_remaining_level1() {
        let (first, first_calls) = SpyFilter::new(false);
        let (second, second_calls) = SpyFilter::new(true);

        let mut pipeline = FilterPipeline::new();
        pipeline.add_level1(first);
        pipeline.add_level1(second);

        assert!(!pipeline.evaluate(&test_killmail()));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_all_stages_pass() {
        let (l1, l1_calls) = SpyFilter::new(true);
        let (l2, l2_calls) = SpyFilter::new(true);

        let mut pipeline = FilterPipeline::new();
        pipeline.add_level1(l1);
        pipeline.add_level2(l2);

        assert!(pipeline.evaluate(&test_killmail()));
        assert_eq!(l1_calls.load(Ordering::SeqCst), 1);
        assert_eq!(l2_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_level2_reject_short_circuits_remaining_level2() {
        let (l1, _) = SpyFilter::new(true);
        let (first, _) = SpyFilter::new(false);
        let (second, second_calls) = SpyFilter::new(true);

        let mut pipeline = FilterPipeline::new();
        pipeline.add_level1(l1);
        pipeline.add_level2(first);
        pipeline.add_level2(second);

        assert!(!pipeline.evaluate(&test_killmail()));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }
}
