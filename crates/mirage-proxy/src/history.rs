//! Bounded per-endpoint history of completed exchanges.

use crate::exchange::InterceptedExchange;
use std::collections::VecDeque;

/// FIFO ring of completed exchanges.
///
/// The capacity is passed on every append rather than fixed at construction:
/// lowering `maxRequestHistory` trims the buffer on the next append.
#[derive(Debug, Default, Clone)]
pub struct History {
    entries: VecDeque<InterceptedExchange>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail, evicting from the head while above `limit`.
    /// Returns the number of evicted entries.
    pub fn push(&mut self, exchange: InterceptedExchange, limit: usize) -> usize {
        self.entries.push_back(exchange);
        let mut evicted = 0;
        while self.entries.len() > limit.max(1) {
            self.entries.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order, oldest first
    pub fn entries(&self) -> Vec<InterceptedExchange> {
        self.entries.iter().cloned().collect()
    }

    /// Entries newest first
    pub fn recent_first(&self) -> Vec<InterceptedExchange> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&InterceptedExchange> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::exchange::{CapturedRequest, ClientInfo, DbQuery};

    fn exchange(text: &str) -> InterceptedExchange {
        InterceptedExchange::pending(
            5433,
            Protocol::Postgres,
            1,
            &CapturedRequest::Query(DbQuery::new(text)),
            ClientInfo::default(),
            1024,
        )
        .into_failed("test", 0)
    }

    fn texts(entries: &[InterceptedExchange]) -> Vec<String> {
        entries.iter().map(|e| e.request.clone()).collect()
    }

    #[test]
    fn test_fifo_eviction() {
        let mut history = History::new();
        for i in 0..5 {
            history.push(exchange(&format!("SELECT {i}")), 3);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(texts(&history.entries()), vec!["SELECT 2", "SELECT 3", "SELECT 4"]);
        assert_eq!(
            texts(&history.recent_first()),
            vec!["SELECT 4", "SELECT 3", "SELECT 2"]
        );
    }

    #[test]
    fn test_reduced_limit_trims_on_next_append() {
        let mut history = History::new();
        for i in 0..10 {
            history.push(exchange(&format!("SELECT {i}")), 10);
        }
        assert_eq!(history.len(), 10);

        let evicted = history.push(exchange("SELECT 10"), 4);
        assert_eq!(evicted, 7);
        assert_eq!(
            texts(&history.entries()),
            vec!["SELECT 7", "SELECT 8", "SELECT 9", "SELECT 10"]
        );
    }

    #[test]
    fn test_get_and_clear() {
        let mut history = History::new();
        let first = exchange("SELECT 2");
        let id = first.id.clone();
        history.push(first, 10);
        assert!(history.get(&id).is_some());

        history.clear();
        assert!(history.is_empty());
        assert!(history.get(&id).is_none());
    }
}
