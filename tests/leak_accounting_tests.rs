//! Leak accounting: byte totals, visibility refinements, and the
//! checkpoint/revert cycle used between repeated heap scans

mod utils;

use memoria::category::DefectCategory;
use memoria::config::ReportConfig;
use memoria::engine::{Disposition, LeakReport};
use memoria::format::ReportScratch;
use utils::{engine_with_symbols, leak, possible_leak};

const SYMBOLS: &[(u64, &str, &str)] = &[
    (0x100, "app", "make_buffer"),
    (0x200, "app", "lose_buffer"),
    (0x300, "app", "main"),
];

#[test]
fn test_leak_bytes_accumulate_across_duplicates() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "");
    let mut scratch = ReportScratch::new();
    let frames = [0x100, 0x300];
    let first = engine.report_leak(
        &mut scratch,
        &LeakReport {
            indirect_size: 16,
            ..leak(100, &frames)
        },
    );
    assert_eq!(first, Disposition::Reported { id: 1 });
    let dup = engine.report_leak(&mut scratch, &leak(100, &frames));
    assert_eq!(
        dup,
        Disposition::Duplicate {
            id: 1,
            suppressed: false
        }
    );
    let stats = engine.stats();
    // 100 + 16 indirect from the first report, 100 from the duplicate
    assert_eq!(stats.bytes_leaked, 216);
    assert_eq!(stats.unique(DefectCategory::Leak), 1);
    assert_eq!(stats.total(DefectCategory::Leak), 2);
    assert_eq!(stats.total_leaks, 2);
}

#[test]
fn test_possible_and_definite_leaks_are_separate_pools() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "");
    let mut scratch = ReportScratch::new();
    engine.report_leak(&mut scratch, &leak(100, &[0x100, 0x300]));
    engine.report_leak(&mut scratch, &possible_leak(30, &[0x200, 0x300]));
    let stats = engine.stats();
    assert_eq!(stats.bytes_leaked, 100);
    assert_eq!(stats.bytes_possible_leaked, 30);
    assert_eq!(stats.unique(DefectCategory::Leak), 1);
    assert_eq!(stats.unique(DefectCategory::PossibleLeak), 1);
}

#[test]
fn test_reachable_counted_but_hidden_by_default() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "");
    let mut scratch = ReportScratch::new();
    let d = engine.report_leak(
        &mut scratch,
        &LeakReport {
            reachable: true,
            ..leak(64, &[0x100])
        },
    );
    assert_eq!(d, Disposition::Ignored);
    let stats = engine.stats();
    assert_eq!(stats.reachable_leaks, 1);
    // Not a defect: no record, no totals
    assert_eq!(stats.total_leaks, 0);
    assert_eq!(stats.unique(DefectCategory::Leak), 0);
}

#[test]
fn test_early_leaks_ignored_by_policy() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "");
    let mut scratch = ReportScratch::new();
    let d = engine.report_leak(
        &mut scratch,
        &LeakReport {
            early: true,
            ..leak(64, &[0x100])
        },
    );
    assert_eq!(d, Disposition::Ignored);
    let stats = engine.stats();
    assert_eq!(stats.leaks_ignored, 1);
    assert_eq!(stats.total_leaks, 1);
    assert_eq!(stats.unique(DefectCategory::Leak), 0);
    assert_eq!(stats.bytes_leaked, 0);
}

#[test]
fn test_invisible_possible_leak_counts_without_id() {
    let config = ReportConfig {
        possible_leaks: false,
        ..ReportConfig::default()
    };
    let engine = engine_with_symbols(config, SYMBOLS, "");
    let mut scratch = ReportScratch::new();
    let d = engine.report_leak(&mut scratch, &possible_leak(30, &[0x200]));
    assert_eq!(d, Disposition::Reported { id: 0 });
    let stats = engine.stats();
    assert_eq!(stats.unique(DefectCategory::PossibleLeak), 1);
    assert_eq!(stats.bytes_possible_leaked, 30);
}

#[test]
fn test_leak_throttle_uses_its_own_cap() {
    let config = ReportConfig {
        report_leak_max: Some(2),
        ..ReportConfig::default()
    };
    let engine = engine_with_symbols(config, SYMBOLS, "");
    let mut scratch = ReportScratch::new();
    engine.report_leak(&mut scratch, &leak(10, &[0x100]));
    engine.report_leak(&mut scratch, &leak(10, &[0x200]));
    let d = engine.report_leak(&mut scratch, &leak(10, &[0x300]));
    assert_eq!(d, Disposition::Throttled);
    let stats = engine.stats();
    assert_eq!(stats.throttled_leaks, 1);
    assert_eq!(stats.total_leaks, 2);
    // Error throttling is a separate pool
    assert_eq!(stats.throttled_errors, 0);
}

#[test]
fn test_checkpoint_revert_round_trip() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "LEAK\napp!lose_buffer\n");
    let mut scratch = ReportScratch::new();

    engine.checkpoint();
    let before = engine.stats();

    // A reported leak, a duplicate, a suppressed leak, and a possible leak
    let frames = [0x100, 0x300];
    let d = engine.report_leak(&mut scratch, &leak(100, &frames));
    assert_eq!(d, Disposition::Reported { id: 1 });
    engine.report_leak(&mut scratch, &leak(100, &frames));
    let d = engine.report_leak(&mut scratch, &leak(50, &[0x200, 0x300]));
    assert_eq!(d, Disposition::Suppressed { by_default: false });
    engine.report_leak(&mut scratch, &possible_leak(30, &[0x300]));

    let mutated = engine.stats();
    assert_eq!(mutated.total_leaks, 4);
    assert_eq!(mutated.bytes_leaked, 200);
    assert_eq!(mutated.bytes_possible_leaked, 30);
    assert_eq!(mutated.suppressed_leaks_user, 1);

    engine.revert();
    let after = engine.stats();
    assert_eq!(after.total_leaks, before.total_leaks);
    assert_eq!(after.bytes_leaked, before.bytes_leaked);
    assert_eq!(after.bytes_possible_leaked, before.bytes_possible_leaked);
    assert_eq!(after.suppressed_leaks_user, before.suppressed_leaks_user);
    assert_eq!(after.unique(DefectCategory::Leak), 0);
    assert_eq!(after.total(DefectCategory::Leak), 0);
    assert_eq!(
        after.unique(DefectCategory::PossibleLeak),
        before.unique(DefectCategory::PossibleLeak)
    );
}

#[test]
fn test_rescan_after_revert_keeps_ids_and_verdicts() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "LEAK\napp!lose_buffer\n");
    let mut scratch = ReportScratch::new();
    let frames = [0x100, 0x300];
    let suppressed_frames = [0x200, 0x300];

    engine.checkpoint();
    assert_eq!(
        engine.report_leak(&mut scratch, &leak(100, &frames)),
        Disposition::Reported { id: 1 }
    );
    assert_eq!(
        engine.report_leak(&mut scratch, &leak(50, &suppressed_frames)),
        Disposition::Suppressed { by_default: false }
    );
    engine.revert();

    // Second scan: same leaks look new again but keep their identity
    let d = engine.report_leak(&mut scratch, &leak(100, &frames));
    assert_eq!(d, Disposition::Reported { id: 1 });
    let d = engine.report_leak(&mut scratch, &leak(50, &suppressed_frames));
    assert_eq!(d, Disposition::Suppressed { by_default: false });

    let stats = engine.stats();
    // One scan's worth of accounting, not two
    assert_eq!(stats.unique(DefectCategory::Leak), 1);
    assert_eq!(stats.total(DefectCategory::Leak), 1);
    assert_eq!(stats.bytes_leaked, 100);
    assert_eq!(stats.suppressed_leaks_user, 1);
}

#[test]
fn test_revert_does_not_touch_error_records() {
    use utils::defect;

    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "");
    let mut scratch = ReportScratch::new();
    engine.checkpoint();
    engine.report_defect(&mut scratch, &defect(DefectCategory::Warning, &[0x100]));
    engine.revert();
    let stats = engine.stats();
    assert_eq!(stats.unique(DefectCategory::Warning), 1);
    // The warning record's count survives: a repeat is still a duplicate
    let d = engine.report_defect(&mut scratch, &defect(DefectCategory::Warning, &[0x100]));
    assert!(matches!(d, Disposition::Duplicate { id: 1, .. }));
}

#[test]
fn test_suppressed_duplicate_adds_bytes_to_rule() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "LEAK\napp!lose_buffer\n");
    let mut scratch = ReportScratch::new();
    let frames = [0x200, 0x300];
    engine.report_leak(&mut scratch, &leak(50, &frames));
    engine.report_leak(&mut scratch, &leak(50, &frames));
    let used = engine.summary_data().suppressions_used;
    assert_eq!(used[0].count_used, 1);
    // First occurrence and duplicate both attribute their bytes
    assert_eq!(used[0].bytes_leaked, Some(100));
    let stats = engine.stats();
    assert_eq!(stats.suppressed_leaks_user, 2);
    assert_eq!(stats.bytes_leaked, 0);
}

#[test]
fn test_no_check_leaks_counts_without_dedup() {
    let config = ReportConfig {
        check_leaks: false,
        ..ReportConfig::default()
    };
    let engine = engine_with_symbols(config, SYMBOLS, "");
    let mut scratch = ReportScratch::new();
    let frames = [0x100, 0x300];
    engine.report_leak(&mut scratch, &leak(100, &frames));
    engine.report_leak(&mut scratch, &leak(100, &frames));
    let stats = engine.stats();
    // No dedup: every report counts as its own leak
    assert_eq!(stats.unique(DefectCategory::Leak), 2);
    assert_eq!(stats.bytes_leaked, 200);
    assert!(engine.summary_data().duplicates.is_empty());
}
