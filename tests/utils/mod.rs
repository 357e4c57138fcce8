// Shared helpers for integration tests: a symbol-table-backed engine and
// report constructors.
#![allow(dead_code)]

use memoria::callstack::SymbolizedFrame;
use memoria::category::DefectCategory;
use memoria::config::ReportConfig;
use memoria::engine::{DefectReport, LeakReport, ReportEngine, StackInput};
use memoria::suppress::Provenance;
use memoria::trace::TraceSymbolizer;

/// Build an engine whose symbolizer resolves `(address, module, function)`
/// triples, with `rules` loaded as user policy and output discarded.
pub fn engine_with_symbols(
    config: ReportConfig,
    symbols: &[(u64, &str, &str)],
    rules: &str,
) -> ReportEngine {
    let mut sym = TraceSymbolizer::new();
    for (address, module, function) in symbols {
        sym.insert(
            *address,
            SymbolizedFrame::Module {
                module: (*module).to_string(),
                offset: *address,
                function: Some((*function).to_string()),
            },
        );
    }
    let mut engine = ReportEngine::new(config, Box::new(sym));
    engine.set_report_sink(Box::new(std::io::sink()));
    if !rules.is_empty() {
        engine
            .load_suppressions(rules, Provenance::User)
            .expect("test rules should parse");
    }
    engine
}

pub fn defect<'a>(category: DefectCategory, frames: &'a [u64]) -> DefectReport<'a> {
    DefectReport {
        category,
        address: 0xbeef,
        size: 4,
        is_write: false,
        container: None,
        stack: StackInput::Captured(frames),
        instruction: None,
        routine: Some("test"),
        thread_id: 1,
    }
}

pub fn leak<'a>(size: usize, frames: &'a [u64]) -> LeakReport<'a> {
    LeakReport {
        known_allocation: true,
        address: 0x8000,
        size,
        indirect_size: 0,
        early: false,
        reachable: false,
        maybe_reachable: false,
        stack: StackInput::Captured(frames),
    }
}

pub fn possible_leak<'a>(size: usize, frames: &'a [u64]) -> LeakReport<'a> {
    LeakReport {
        maybe_reachable: true,
        ..leak(size, frames)
    }
}
