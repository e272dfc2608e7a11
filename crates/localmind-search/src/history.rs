//! Bounded, deduplicated query history.
//!
//! Most recent first. Two queries are the same entry when their normalized
//! text matches.

use std::collections::VecDeque;

use chrono::Utc;

use crate::types::HistoryEntry;

/// Collapse whitespace and lowercase.
pub fn normalize(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub struct SearchHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl SearchHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Record a query. Repeats move to the front; the oldest entry falls off
    /// past the limit. Blank queries are ignored.
    pub fn add(&mut self, query: &str) -> bool {
        let key = normalize(query);
        if key.is_empty() {
            return false;
        }

        self.entries.retain(|e| normalize(&e.query) != key);
        self.entries.push_front(HistoryEntry {
            query: query.trim().to_string(),
            searched_at: Utc::now(),
        });
        while self.entries.len() > self.limit {
            self.entries.pop_back();
        }
        true
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Past queries starting with `prefix`, most recent first.
    pub fn suggestions(&self, prefix: &str, limit: usize) -> Vec<String> {
        let prefix = normalize(prefix);
        self.entries
            .iter()
            .filter(|e| normalize(&e.query).starts_with(&prefix))
            .take(limit)
            .map(|e| e.query.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queries(history: &SearchHistory) -> Vec<String> {
        history.entries().into_iter().map(|e| e.query).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Neural   Network \t"), "neural network");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_move_to_front() {
        let mut history = SearchHistory::new(10);
        history.add("rust async");
        history.add("embeddings");
        history.add("  Rust   ASYNC ");
        assert_eq!(queries(&history), vec!["Rust   ASYNC", "embeddings"]);
    }

    #[test]
    fn test_cap() {
        let mut history = SearchHistory::new(3);
        for q in ["a", "b", "c", "d", "e"] {
            history.add(q);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(queries(&history), vec!["e", "d", "c"]);

        // Re-adding an existing entry never grows past the cap.
        history.add("c");
        assert_eq!(queries(&history), vec!["c", "e", "d"]);
    }

    #[test]
    fn test_blank_ignored() {
        let mut history = SearchHistory::new(3);
        assert!(!history.add("  "));
        assert!(history.is_empty());
    }

    #[test]
    fn test_suggestions() {
        let mut history = SearchHistory::new(10);
        history.add("neural network");
        history.add("Neural search");
        history.add("vector db");
        assert_eq!(history.suggestions("neu", 5), vec!["Neural search", "neural network"]);
        assert_eq!(history.suggestions("NEU", 1), vec!["Neural search"]);
        assert!(history.suggestions("graph", 5).is_empty());
    }
}
