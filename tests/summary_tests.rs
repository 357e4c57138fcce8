//! End-of-run summary content

mod utils;

use memoria::category::DefectCategory;
use memoria::config::ReportConfig;
use memoria::format::ReportScratch;
use memoria::suppress::Provenance;
use utils::{defect, engine_with_symbols, leak, possible_leak};

const SYMBOLS: &[(u64, &str, &str)] = &[
    (0x100, "app", "alpha"),
    (0x200, "app", "beta"),
    (0x300, "app", "main"),
];

#[test]
fn test_duplicate_counts_listed_in_id_order() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "");
    let mut scratch = ReportScratch::new();
    for _ in 0..3 {
        engine.report_defect(&mut scratch, &defect(DefectCategory::Warning, &[0x100]));
    }
    for _ in 0..2 {
        engine.report_defect(
            &mut scratch,
            &defect(DefectCategory::UninitializedRead, &[0x200]),
        );
    }
    let summary = engine.render_summary(false);
    let dup_section = summary
        .split("SUPPRESSIONS USED:")
        .next()
        .expect("summary has sections");
    assert!(dup_section.contains("Error #   1:      3"));
    assert!(dup_section.contains("Error #   2:      2"));
    let pos1 = summary.find("Error #   1").unwrap();
    let pos2 = summary.find("Error #   2").unwrap();
    assert!(pos1 < pos2);
}

#[test]
fn test_suppression_usage_with_leak_bytes() {
    let engine = engine_with_symbols(
        ReportConfig::default(),
        SYMBOLS,
        "LEAK\nname=lost buffers\napp!beta\n",
    );
    let mut scratch = ReportScratch::new();
    engine.report_leak(&mut scratch, &leak(512, &[0x200, 0x300]));
    let summary = engine.render_summary(false);
    assert!(summary.contains("SUPPRESSIONS USED:"));
    assert!(summary.contains("1x (leaked     512 bytes): lost buffers"));
}

#[test]
fn test_unused_rules_are_not_listed() {
    let engine = engine_with_symbols(
        ReportConfig::default(),
        SYMBOLS,
        "LEAK\nname=never fires\napp!zzz\n",
    );
    let summary = engine.render_summary(false);
    assert!(!summary.contains("never fires"));
}

#[test]
fn test_default_rule_usage_hidden_without_full_stats() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "");
    engine
        .load_suppressions("WARNING\nname=shipped rule\napp!alpha\n", Provenance::Default)
        .expect("rule should parse");
    let mut scratch = ReportScratch::new();
    engine.report_defect(&mut scratch, &defect(DefectCategory::Warning, &[0x100]));
    let user_view = engine.render_summary(false);
    assert!(!user_view.contains("shipped rule"));
    let full_view = engine.render_summary(true);
    assert!(full_view.contains("shipped rule"));
    // Either way the suppression count shows up in the ignored section
    assert!(user_view.contains("0 user-suppressed,     1 default-suppressed error(s)"));
}

#[test]
fn test_category_aggregates_and_bytes() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "");
    let mut scratch = ReportScratch::new();
    engine.report_defect(&mut scratch, &defect(DefectCategory::Warning, &[0x100]));
    engine.report_defect(&mut scratch, &defect(DefectCategory::Warning, &[0x100]));
    engine.report_leak(&mut scratch, &leak(100, &[0x200, 0x300]));
    engine.report_leak(&mut scratch, &possible_leak(30, &[0x300]));
    let summary = engine.render_summary(false);
    assert!(summary.contains("1 unique,     2 total warning(s)"));
    assert!(summary.contains("1 unique,     1 total,    100 byte(s) of leak(s)"));
    assert!(summary.contains("1 unique,     1 total,     30 byte(s) of possible leak(s)"));
}

#[test]
fn test_throttle_lines_only_when_nonzero() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "");
    let summary = engine.render_summary(false);
    assert!(!summary.contains("beyond --report-max"));

    let config = ReportConfig {
        report_max: Some(0),
        ..ReportConfig::default()
    };
    let engine = engine_with_symbols(config, SYMBOLS, "");
    let mut scratch = ReportScratch::new();
    engine.report_defect(&mut scratch, &defect(DefectCategory::Warning, &[0x100]));
    let summary = engine.render_summary(false);
    assert!(summary.contains("1 error(s) beyond --report-max"));
}

#[test]
fn test_reachable_note_and_advisory() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "");
    let mut scratch = ReportScratch::new();
    engine.report_leak(
        &mut scratch,
        &memoria::engine::LeakReport {
            reachable: true,
            ..leak(64, &[0x100])
        },
    );
    let summary = engine.render_summary(false);
    assert!(summary.contains("1 still-reachable allocation(s)"));
    assert!(summary.contains("--show-reachable"));
}

#[test]
fn test_json_summary_shape() {
    let engine = engine_with_symbols(ReportConfig::default(), SYMBOLS, "LEAK\napp!beta\n");
    let mut scratch = ReportScratch::new();
    engine.report_leak(&mut scratch, &leak(512, &[0x200, 0x300]));
    engine.report_defect(&mut scratch, &defect(DefectCategory::Warning, &[0x100]));
    let data = engine.summary_data();
    let json = serde_json::to_value(&data).expect("summary serializes");
    assert_eq!(json["categories"].as_array().unwrap().len(), 6);
    assert_eq!(json["suppressions_used"][0]["bytes_leaked"], 512);
    assert_eq!(json["suppressed_leaks_user"], 1);
    let warning = json["categories"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["category"] == "warning")
        .expect("warning category present");
    assert_eq!(warning["unique"], 1);
}
