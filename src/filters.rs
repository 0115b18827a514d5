//! Subreddit predicate. The target set is immutable and shared by reference across workers.

use crate::record::Record;
use ahash::AHashSet;
use std::sync::Arc;

/// Target subreddit labels. Case-sensitive, exact match. Cloning shares the set.
#[derive(Clone, Debug, Default)]
pub struct FilterConfig {
    targets: Arc<AHashSet<String>>,
}

impl FilterConfig {
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = targets.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self { targets: Arc::new(set) }
    }

    #[inline]
    pub fn contains(&self, label: &str) -> bool {
        self.targets.contains(label)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Labels in sorted order (for logging).
    pub fn sorted(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.targets.iter().map(String::as_str).collect();
        v.sort_unstable();
        v
    }
}

/// True iff the record carries a string `subreddit` that is one of the targets.
/// Records without the field never match.
#[inline]
pub fn matches(record: &Record, targets: &FilterConfig) -> bool {
    record.label().is_some_and(|s| targets.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn rec(v: Value) -> Record {
        let raw = v.to_string();
        match v {
            Value::Object(map) => Record::new(raw, map),
            _ => unreachable!("test records are objects"),
        }
    }

    #[test]
    fn exact_match_only() {
        let f = FilterConfig::new(["LetsTalkMusic"]);
        assert!(matches(&rec(json!({"subreddit": "LetsTalkMusic", "id": 1})), &f));
        assert!(!matches(&rec(json!({"subreddit": "letstalkmusic"})), &f));
        assert!(!matches(&rec(json!({"subreddit": "LetsTalkMusic "})), &f));
        assert!(!matches(&rec(json!({"subreddit": "other"})), &f));
    }

    #[test]
    fn missing_or_non_string_label_does_not_match() {
        let f = FilterConfig::new(["1", "null"]);
        assert!(!matches(&rec(json!({"id": 1})), &f));
        assert!(!matches(&rec(json!({"subreddit": 1})), &f));
        assert!(!matches(&rec(json!({"subreddit": null})), &f));
    }

    #[test]
    fn clones_share_the_same_set() {
        let f = FilterConfig::new(["a", "b", "a"]);
        let g = f.clone();
        assert!(Arc::ptr_eq(&f.targets, &g.targets));
        assert_eq!(g.len(), 2);
        assert_eq!(g.sorted(), vec!["a", "b"]);
    }
}
