use std::collections::{HashMap, VecDeque};

use crate::category::{ErrorCategory, Severity};
use crate::record::ErrorRecord;

/// Default number of records kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

const RECENT_COUNT: usize = 5;

/// Fixed-capacity diagnostic history. Inserting into a full history evicts
/// the oldest record.
#[derive(Debug, Clone)]
pub struct ErrorHistory {
    entries: VecDeque<ErrorRecord>,
    capacity: usize,
}

/// Aggregate view over an [`ErrorHistory`].
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total: usize,
    pub by_category: HashMap<ErrorCategory, usize>,
    pub by_severity: HashMap<Severity, usize>,
    /// Most recent records, newest first.
    pub recent: Vec<ErrorRecord>,
}

impl ErrorHistory {
    /// Creates a history holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: ErrorRecord) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    /// Iterates newest first.
    pub fn iter(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.entries.iter().rev()
    }

    /// Returns a copy of all records, newest first.
    pub fn snapshot(&self) -> Vec<ErrorRecord> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> ErrorStats {
        let mut stats = ErrorStats {
            total: self.entries.len(),
            ..ErrorStats::default()
        };
        for record in &self.entries {
            *stats.by_category.entry(record.category).or_default() += 1;
            *stats.by_severity.entry(record.severity).or_default() += 1;
        }
        stats.recent = self.iter().take(RECENT_COUNT).cloned().collect();
        stats
    }
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
