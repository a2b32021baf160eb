//! Per-page cumulative reading time and the time gate built on it.

use crate::navigation::{NavigationPosition, PageId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Persisted cumulative time for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReadingRecord {
    /// `"{chapter}-{sub_page}"`.
    pub page_id: PageId,
    /// Seconds spent on the page across all visits.
    pub cumulative_seconds: u64,
}

/// Reading time per page: flushed totals plus the counters still running.
#[derive(Debug, Clone)]
pub struct ReadingTimeLedger {
    threshold: u64,
    totals: BTreeMap<PageId, u64>,
    unflushed: HashMap<PageId, u64>,
}

impl ReadingTimeLedger {
    /// Create an empty ledger unlocking pages at `threshold` seconds.
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            totals: BTreeMap::new(),
            unflushed: HashMap::new(),
        }
    }

    /// Create a ledger seeded with persisted records.
    ///
    /// Duplicate identifiers are summed so each page keeps one total.
    pub fn with_records(threshold: u64, records: &[PageReadingRecord]) -> Self {
        let mut ledger = Self::new(threshold);
        for record in records {
            *ledger.totals.entry(record.page_id.clone()).or_insert(0) +=
                record.cumulative_seconds;
        }
        ledger
    }

    /// Unlock threshold in seconds.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Count one second against `page`.
    pub fn tick(&mut self, page: &PageId) {
        *self.unflushed.entry(page.clone()).or_insert(0) += 1;
    }

    /// Add the running counter for `page` to its total and reset the counter.
    ///
    /// Returns the new cumulative total.
    pub fn flush(&mut self, page: &PageId) -> u64 {
        let elapsed = self.unflushed.remove(page).unwrap_or(0);
        let total = self.totals.entry(page.clone()).or_insert(0);
        *total += elapsed;

        if elapsed > 0 {
            tracing::debug!(page = %page, elapsed, total = *total, "Flushed reading time");
        }
        *total
    }

    /// Seconds counted for `page` since its last flush.
    pub fn unflushed_seconds(&self, page: &PageId) -> u64 {
        self.unflushed.get(page).copied().unwrap_or(0)
    }

    /// Flushed cumulative seconds for `page`.
    pub fn total_seconds(&self, page: &PageId) -> u64 {
        self.totals.get(page).copied().unwrap_or(0)
    }

    /// Whether the flushed total for `page` reaches the threshold.
    pub fn is_unlocked(&self, page: &PageId) -> bool {
        self.total_seconds(page) >= self.threshold
    }

    /// Seconds still needed on `page`, counting the running counter.
    pub fn seconds_remaining(&self, page: &PageId) -> u64 {
        let spent = self.total_seconds(page) + self.unflushed_seconds(page);
        self.threshold.saturating_sub(spent)
    }

    /// Whether a page counts as read.
    ///
    /// Pages strictly before `current` always count; others only once
    /// their time gate is open.
    pub fn has_been_read(&self, target: NavigationPosition, current: NavigationPosition) -> bool {
        target < current || self.is_unlocked(&target.page_id())
    }

    /// Flushed totals as records, ordered by identifier.
    pub fn records(&self) -> Vec<PageReadingRecord> {
        self.totals
            .iter()
            .map(|(page_id, &cumulative_seconds)| PageReadingRecord {
                page_id: page_id.clone(),
                cumulative_seconds,
            })
            .collect()
    }
}
