//! Aggregate counters and the leak-accounting checkpoint
//!
//! All counters live in one structure guarded by the engine lock. The
//! checkpoint snapshot covers exactly the counters mutated by leak
//! reporting, so a revert between heap scans rewinds leak accounting
//! without touching the other error categories.

use crate::category::{DefectCategory, CATEGORY_COUNT};

/// Running totals maintained by the aggregator
#[derive(Debug, Clone, Default)]
pub struct ReportStats {
    /// Distinct (id-assigned or counted) defects per category
    pub unique: [u32; CATEGORY_COUNT],
    /// Non-suppressed occurrences per category
    pub total: [u32; CATEGORY_COUNT],
    /// First occurrences actually reported (non-leak categories)
    pub reported_errors: u32,
    /// Every leak report that passed the visibility gates
    pub total_leaks: u32,
    pub throttled_errors: u32,
    pub throttled_leaks: u32,
    /// Early allocations excluded by policy before dedup
    pub leaks_ignored: u32,
    pub bytes_leaked: u64,
    pub bytes_possible_leaked: u64,
    pub suppressions_matched_user: u32,
    pub suppressions_matched_default: u32,
    pub suppressed_leaks_user: u32,
    pub suppressed_leaks_default: u32,
    /// Live allocations still referenced at scan time
    pub reachable_leaks: u32,
}

impl ReportStats {
    pub fn unique(&self, category: DefectCategory) -> u32 {
        self.unique[category.index()]
    }

    pub fn total(&self, category: DefectCategory) -> u32 {
        self.total[category.index()]
    }

    /// Snapshot every counter that leak reporting mutates
    pub fn checkpoint(&self) -> LeakCheckpoint {
        LeakCheckpoint {
            throttled_leaks: self.throttled_leaks,
            total_leaks: self.total_leaks,
            leaks_ignored: self.leaks_ignored,
            suppressed_leaks_user: self.suppressed_leaks_user,
            suppressed_leaks_default: self.suppressed_leaks_default,
            possible_unique: self.unique[DefectCategory::PossibleLeak.index()],
            possible_total: self.total[DefectCategory::PossibleLeak.index()],
            reachable_leaks: self.reachable_leaks,
            leak_unique: self.unique[DefectCategory::Leak.index()],
            leak_total: self.total[DefectCategory::Leak.index()],
            bytes_leaked: self.bytes_leaked,
            bytes_possible_leaked: self.bytes_possible_leaked,
        }
    }

    /// Restore exactly the counters captured by [`ReportStats::checkpoint`]
    pub fn revert(&mut self, saved: &LeakCheckpoint) {
        self.throttled_leaks = saved.throttled_leaks;
        self.total_leaks = saved.total_leaks;
        self.leaks_ignored = saved.leaks_ignored;
        self.suppressed_leaks_user = saved.suppressed_leaks_user;
        self.suppressed_leaks_default = saved.suppressed_leaks_default;
        self.unique[DefectCategory::PossibleLeak.index()] = saved.possible_unique;
        self.total[DefectCategory::PossibleLeak.index()] = saved.possible_total;
        self.reachable_leaks = saved.reachable_leaks;
        self.unique[DefectCategory::Leak.index()] = saved.leak_unique;
        self.total[DefectCategory::Leak.index()] = saved.leak_total;
        self.bytes_leaked = saved.bytes_leaked;
        self.bytes_possible_leaked = saved.bytes_possible_leaked;
    }
}

/// Saved leak-accounting state from the last checkpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct LeakCheckpoint {
    pub throttled_leaks: u32,
    pub total_leaks: u32,
    pub leaks_ignored: u32,
    pub suppressed_leaks_user: u32,
    pub suppressed_leaks_default: u32,
    pub possible_unique: u32,
    pub possible_total: u32,
    pub reachable_leaks: u32,
    pub leak_unique: u32,
    pub leak_total: u32,
    pub bytes_leaked: u64,
    pub bytes_possible_leaked: u64,
}
