//! Defect categories reported by the detector
//!
//! The set is closed: every record, suppression rule, and counter in the
//! engine is keyed by one of these six values.

use serde::{Deserialize, Serialize};

/// Number of defect categories (array-table dimension)
pub const CATEGORY_COUNT: usize = 6;

/// Kind of defect delivered by the detection layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectCategory {
    /// Read or write of memory that is not addressable
    UnaddressableAccess,
    /// Read of a value that was never initialized
    UninitializedRead,
    /// Bad pointer or size handed to a heap routine
    InvalidHeapArgument,
    /// Detector-level warning surfaced to the user
    Warning,
    /// Allocation with no remaining references at scan time
    Leak,
    /// Allocation reachable only through imprecise pointer scanning
    PossibleLeak,
}

impl DefectCategory {
    /// All categories in fixed table order
    pub const ALL: [DefectCategory; CATEGORY_COUNT] = [
        DefectCategory::UnaddressableAccess,
        DefectCategory::UninitializedRead,
        DefectCategory::InvalidHeapArgument,
        DefectCategory::Warning,
        DefectCategory::Leak,
        DefectCategory::PossibleLeak,
    ];

    /// Position in per-category counter tables
    pub fn index(self) -> usize {
        match self {
            DefectCategory::UnaddressableAccess => 0,
            DefectCategory::UninitializedRead => 1,
            DefectCategory::InvalidHeapArgument => 2,
            DefectCategory::Warning => 3,
            DefectCategory::Leak => 4,
            DefectCategory::PossibleLeak => 5,
        }
    }

    /// Header naming this category in suppression files and report blocks
    pub fn header(self) -> &'static str {
        match self {
            DefectCategory::UnaddressableAccess => "UNADDRESSABLE ACCESS",
            DefectCategory::UninitializedRead => "UNINITIALIZED READ",
            DefectCategory::InvalidHeapArgument => "INVALID HEAP ARGUMENT",
            DefectCategory::Warning => "WARNING",
            DefectCategory::Leak => "LEAK",
            DefectCategory::PossibleLeak => "POSSIBLE LEAK",
        }
    }

    /// Noun phrase used in the end-of-run summary
    pub fn noun(self) -> &'static str {
        match self {
            DefectCategory::UnaddressableAccess => "unaddressable access(es)",
            DefectCategory::UninitializedRead => "uninitialized access(es)",
            DefectCategory::InvalidHeapArgument => "invalid heap argument(s)",
            DefectCategory::Warning => "warning(s)",
            DefectCategory::Leak => "leak(s)",
            DefectCategory::PossibleLeak => "possible leak(s)",
        }
    }

    /// Whether this category participates in leak byte accounting
    pub fn is_leak(self) -> bool {
        matches!(self, DefectCategory::Leak | DefectCategory::PossibleLeak)
    }

    /// Identify the category that starts a suppression block.
    ///
    /// A block header is a line that begins with the category name; trailing
    /// text after the name is tolerated. "POSSIBLE LEAK" is checked before
    /// "LEAK" falls out naturally because the prefix test is exact per name.
    pub fn from_header_prefix(line: &str) -> Option<DefectCategory> {
        DefectCategory::ALL
            .into_iter()
            .find(|cat| line.starts_with(cat.header()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trips_table_order() {
        for (i, cat) in DefectCategory::ALL.into_iter().enumerate() {
            assert_eq!(cat.index(), i);
        }
    }

    #[test]
    fn test_header_prefix_lookup() {
        assert_eq!(
            DefectCategory::from_header_prefix("LEAK"),
            Some(DefectCategory::Leak)
        );
        assert_eq!(
            DefectCategory::from_header_prefix("POSSIBLE LEAK"),
            Some(DefectCategory::PossibleLeak)
        );
        assert_eq!(
            DefectCategory::from_header_prefix("UNADDRESSABLE ACCESS of large size"),
            Some(DefectCategory::UnaddressableAccess)
        );
        assert_eq!(DefectCategory::from_header_prefix("mod!func"), None);
        assert_eq!(DefectCategory::from_header_prefix(""), None);
    }

    #[test]
    fn test_leak_categories() {
        assert!(DefectCategory::Leak.is_leak());
        assert!(DefectCategory::PossibleLeak.is_leak());
        assert!(!DefectCategory::Warning.is_leak());
    }
}
