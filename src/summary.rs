//! End-of-run summary reporting
//!
//! A pure read traversal of the dedup store and rule catalog: duplicate
//! counts in id order, suppression usage with accumulated leak bytes,
//! per-category aggregates, and throttling totals. Nothing here mutates
//! engine state.

use std::fmt::Write as _;

use serde::Serialize;

use crate::category::DefectCategory;
use crate::engine::ReportEngine;
use crate::suppress::Provenance;

/// Machine-readable form of the end-of-run summary
#[derive(Debug, Serialize)]
pub struct SummaryData {
    pub categories: Vec<CategorySummary>,
    pub duplicates: Vec<DuplicateCount>,
    pub suppressions_used: Vec<SuppressionUsage>,
    pub suppressed_errors_user: u32,
    pub suppressed_errors_default: u32,
    pub suppressed_leaks_user: u32,
    pub suppressed_leaks_default: u32,
    pub leaks_ignored: u32,
    pub reachable_leaks: u32,
    pub throttled_errors: u32,
    pub throttled_leaks: u32,
}

#[derive(Debug, Serialize)]
pub struct CategorySummary {
    pub category: DefectCategory,
    pub unique: u32,
    pub total: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct DuplicateCount {
    pub id: u32,
    pub count: u32,
}

#[derive(Debug, Serialize)]
pub struct SuppressionUsage {
    pub category: DefectCategory,
    pub number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub provenance: Provenance,
    pub count_used: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_leaked: Option<u64>,
}

impl ReportEngine {
    /// Render the human-readable summary. With `full_stats` the view
    /// includes default-policy suppression usage and internal leak counts
    /// normally kept out of the user-facing report.
    pub fn render_summary(&self, full_stats: bool) -> String {
        let config = self.config().clone();
        let state = self.state();
        let stats = &state.stats;
        let mut out = String::new();

        out.push('\n');
        out.push_str("DUPLICATE ERROR COUNTS:\n");
        for record in state.store.iter() {
            // Possible leaks without visibility keep id 0 and are skipped
            if record.count > 1
                && !record.suppressed
                && (record.category() != DefectCategory::PossibleLeak || config.possible_leaks)
            {
                debug_assert!(record.id > 0, "duplicate without an id");
                let _ = writeln!(out, "\tError #{:4}: {:6}", record.id, record.count);
            }
        }

        out.push_str("\nSUPPRESSIONS USED:\n");
        for rule in state.catalog.iter() {
            if rule.count_used > 0 && (full_stats || rule.provenance == Provenance::User) {
                let _ = write!(out, "\t{:6}x", rule.count_used);
                if rule.category.is_leak() {
                    let _ = write!(out, " (leaked {:7} bytes): ", rule.bytes_leaked);
                } else {
                    out.push_str(": ");
                }
                match &rule.name {
                    Some(name) => {
                        let _ = writeln!(out, "{name}");
                    }
                    None => {
                        let _ = writeln!(out, "<no name {}>", rule.number);
                    }
                }
            }
        }

        out.push_str("\nERRORS FOUND:\n");
        for category in DefectCategory::ALL {
            let unique = stats.unique(category);
            let total = stats.total(category);
            if category.is_leak() {
                let bytes = if category == DefectCategory::Leak {
                    stats.bytes_leaked
                } else {
                    stats.bytes_possible_leaked
                };
                if config.check_leaks {
                    let _ = writeln!(
                        out,
                        "  {:5} unique, {:5} total, {:6} byte(s) of {}",
                        unique,
                        total,
                        bytes,
                        category.noun()
                    );
                } else {
                    // No dup checking for leaks: only totals are meaningful
                    let _ = writeln!(
                        out,
                        "  {:5} total, {:6} byte(s) of {}",
                        unique,
                        bytes,
                        category.noun()
                    );
                }
                if category == DefectCategory::Leak && !config.check_leaks {
                    out.push_str("         (enable leak checking for details)\n");
                }
                if category == DefectCategory::PossibleLeak && !config.possible_leaks {
                    out.push_str("         (enable possible-leak reporting for details)\n");
                }
            } else {
                let _ = writeln!(
                    out,
                    "  {:5} unique, {:5} total {}",
                    unique,
                    total,
                    category.noun()
                );
            }
        }

        if !config.brief || stats.throttled_errors > 0 || stats.throttled_leaks > 0 {
            out.push_str("ERRORS IGNORED:\n");
        }
        if !config.brief {
            if !state.catalog.is_empty() {
                let _ = writeln!(
                    out,
                    "  {:5} user-suppressed, {:5} default-suppressed error(s)",
                    stats.suppressions_matched_user, stats.suppressions_matched_default
                );
                let _ = writeln!(
                    out,
                    "  {:5} user-suppressed, {:5} default-suppressed leak(s)",
                    stats.suppressed_leaks_user, stats.suppressed_leaks_default
                );
            }
            if full_stats {
                let _ = writeln!(
                    out,
                    "  {:5} ignored assumed-innocuous system leak(s)",
                    stats.leaks_ignored
                );
            }
            let _ = writeln!(
                out,
                "  {:5} still-reachable allocation(s)",
                stats.reachable_leaks
            );
            if !config.show_reachable {
                out.push_str("         (re-run with \"--show-reachable\" for details)\n");
            }
        }
        if stats.throttled_errors > 0 {
            let _ = writeln!(
                out,
                "  {:5} error(s) beyond --report-max",
                stats.throttled_errors
            );
        }
        if stats.throttled_leaks > 0 {
            let _ = writeln!(
                out,
                "  {:5} leak(s) beyond --report-leak-max",
                stats.throttled_leaks
            );
        }
        out
    }

    /// Write the summary to the report sink, best effort
    pub fn emit_summary(&self, full_stats: bool) {
        let text = self.render_summary(full_stats);
        self.emit(&text);
    }

    /// Build the machine-readable summary
    pub fn summary_data(&self) -> SummaryData {
        let config = self.config().clone();
        let state = self.state();
        let stats = &state.stats;
        SummaryData {
            categories: DefectCategory::ALL
                .into_iter()
                .map(|category| CategorySummary {
                    category,
                    unique: stats.unique(category),
                    total: stats.total(category),
                    bytes: match category {
                        DefectCategory::Leak => Some(stats.bytes_leaked),
                        DefectCategory::PossibleLeak => Some(stats.bytes_possible_leaked),
                        _ => None,
                    },
                })
                .collect(),
            duplicates: state
                .store
                .iter()
                .filter(|record| {
                    record.count > 1
                        && !record.suppressed
                        && (record.category() != DefectCategory::PossibleLeak
                            || config.possible_leaks)
                })
                .map(|record| DuplicateCount {
                    id: record.id,
                    count: record.count,
                })
                .collect(),
            suppressions_used: state
                .catalog
                .iter()
                .filter(|rule| rule.count_used > 0)
                .map(|rule| SuppressionUsage {
                    category: rule.category,
                    number: rule.number,
                    name: rule.name.clone(),
                    provenance: rule.provenance,
                    count_used: rule.count_used,
                    bytes_leaked: rule.category.is_leak().then_some(rule.bytes_leaked),
                })
                .collect(),
            suppressed_errors_user: stats.suppressions_matched_user,
            suppressed_errors_default: stats.suppressions_matched_default,
            suppressed_leaks_user: stats.suppressed_leaks_user,
            suppressed_leaks_default: stats.suppressed_leaks_default,
            leaks_ignored: stats.leaks_ignored,
            reachable_leaks: stats.reachable_leaks,
            throttled_errors: stats.throttled_errors,
            throttled_leaks: stats.throttled_leaks,
        }
    }
}
