//! Leak/error aggregator
//!
//! The central coordinator: every defect the detector reports flows through
//! the decision machine here (throttle, dedup, suppression match, id
//! assignment) under one process-wide lock. Defects are assumed rare
//! relative to execution time, so a single lock is simpler than per-record
//! locking and fast enough. Formatting happens after the lock is released,
//! into a scratch buffer owned by the calling thread.

use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use crate::callstack::{CallstackFingerprint, SymbolizedStack, Symbolizer};
use crate::category::DefectCategory;
use crate::config::ReportConfig;
use crate::format::{self, DefectBlock, LeakBlock, ReportScratch};
use crate::stats::{LeakCheckpoint, ReportStats};
use crate::store::ErrorStore;
use crate::suppress::{Provenance, SuppressionCatalog, SuppressionError};

/// Stack input for a report call.
///
/// The detector either hands over raw captured addresses or a fingerprint
/// it owns (cloned for storage, since capture and storage lifetimes
/// differ).
pub enum StackInput<'a> {
    /// Raw return addresses, top frame first
    Captured(&'a [u64]),
    /// Precomputed fingerprint owned by the caller
    Fingerprint(&'a CallstackFingerprint),
}

/// One defect delivered by the detector (non-leak categories)
pub struct DefectReport<'a> {
    pub category: DefectCategory,
    /// Faulting address
    pub address: u64,
    /// Access size in bytes
    pub size: usize,
    pub is_write: bool,
    /// Enclosing operand range when the access is part of a larger operation
    pub container: Option<(u64, u64)>,
    pub stack: StackInput<'a>,
    /// Disassembled faulting instruction, when available
    pub instruction: Option<&'a str>,
    /// Routine name for invalid heap arguments, message text for warnings
    pub routine: Option<&'a str>,
    pub thread_id: u64,
}

/// One allocation surfaced by a leak scan
pub struct LeakReport<'a> {
    /// Whether the address is a known allocation (otherwise it is merely
    /// still-addressable memory inside a heap region)
    pub known_allocation: bool,
    pub address: u64,
    pub size: usize,
    /// Bytes reachable only through this allocation
    pub indirect_size: usize,
    /// Allocated before instrumentation attached
    pub early: bool,
    /// Still referenced at scan time
    pub reachable: bool,
    /// Reachable only through imprecise pointer scanning
    pub maybe_reachable: bool,
    pub stack: StackInput<'a>,
}

/// What the engine decided about one report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Throttling cap reached; nothing recorded, no output
    Throttled,
    /// Repeat of a known defect; the stored verdict was re-applied
    Duplicate { id: u32, suppressed: bool },
    /// First occurrence silenced by policy
    Suppressed { by_default: bool },
    /// First occurrence counted; id is 0 when visibility policy withheld one
    Reported { id: u32 },
    /// Outside the reporting policy (reachable, early-ignored, invisible)
    Ignored,
}

/// Black-box lookup describing heap activity near a faulting address.
///
/// Supplied by the allocation tracker; the engine only splices the returned
/// note into the report block.
pub trait HeapProximity: Send + Sync {
    fn describe(&self, address: u64, size: usize, invalid_heap_arg: bool) -> Option<String>;
}

type PauseHook = Box<dyn Fn(DefectCategory) + Send + Sync>;

const LEAK_STACK_ADVISORY: &str = "(enable leak checking to obtain a callstack)";

/// Mutable engine state guarded by the process-wide lock
pub(crate) struct EngineState {
    pub(crate) catalog: SuppressionCatalog,
    pub(crate) store: ErrorStore,
    pub(crate) stats: ReportStats,
    /// Last assigned public id; ids are never reused or renumbered
    pub(crate) next_id: u32,
    saved: LeakCheckpoint,
    start: Instant,
}

struct Sinks {
    results: Box<dyn Write + Send>,
    patterns: Option<Box<dyn Write + Send>>,
}

/// The error-deduplication and suppression engine.
///
/// Owns all mutable reporting state; construct one per monitored run. Load
/// suppression policy before concurrent reporting begins, then share the
/// engine across detector threads.
pub struct ReportEngine {
    config: ReportConfig,
    symbolizer: Box<dyn Symbolizer>,
    heap: Option<Box<dyn HeapProximity>>,
    pause: Option<PauseHook>,
    pub(crate) state: Mutex<EngineState>,
    sinks: Mutex<Sinks>,
}

impl ReportEngine {
    pub fn new(config: ReportConfig, symbolizer: Box<dyn Symbolizer>) -> Self {
        Self {
            config,
            symbolizer,
            heap: None,
            pause: None,
            state: Mutex::new(EngineState {
                catalog: SuppressionCatalog::new(),
                store: ErrorStore::new(),
                stats: ReportStats::default(),
                next_id: 0,
                saved: LeakCheckpoint::default(),
                start: Instant::now(),
            }),
            sinks: Mutex::new(Sinks {
                results: Box::new(std::io::stderr()),
                patterns: None,
            }),
        }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Redirect formatted report blocks and the summary
    pub fn set_report_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.sinks.get_mut().unwrap_or_else(|e| e.into_inner()).results = sink;
    }

    /// Collect auto-generated suppression patterns for unmatched defects
    pub fn set_pattern_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.sinks.get_mut().unwrap_or_else(|e| e.into_inner()).patterns = Some(sink);
    }

    pub fn set_heap_lookup(&mut self, heap: Box<dyn HeapProximity>) {
        self.heap = Some(heap);
    }

    /// Hook invoked when an interactive category reports; blocks the
    /// reporting thread until it returns
    pub fn set_pause_hook(&mut self, hook: PauseHook) {
        self.pause = Some(hook);
    }

    /// Compile policy text and append its rules. Fatal on malformed rules:
    /// partial policy could silently under- or over-suppress.
    pub fn load_suppressions(
        &self,
        text: &str,
        provenance: Provenance,
    ) -> Result<u32, SuppressionError> {
        self.state()
            .catalog
            .load_str(text, provenance, self.config.max_frames)
    }

    /// Compile a policy file and append its rules
    pub fn load_suppression_file(
        &self,
        path: &Path,
        provenance: Provenance,
    ) -> Result<u32, SuppressionError> {
        self.state()
            .catalog
            .load_file(path, provenance, self.config.max_frames)
    }

    /// Total suppression rules loaded
    pub fn suppression_count(&self) -> u32 {
        self.state().catalog.len()
    }

    /// Snapshot of the aggregate counters
    pub fn stats(&self) -> ReportStats {
        self.state().stats.clone()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sinks(&self) -> MutexGuard<'_, Sinks> {
        self.sinks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fingerprint(&self, category: DefectCategory, stack: &StackInput<'_>) -> CallstackFingerprint {
        match stack {
            StackInput::Captured(frames) => {
                let depth = frames.len().min(self.config.max_frames);
                CallstackFingerprint::new(category, &frames[..depth])
            }
            StackInput::Fingerprint(fp) => {
                debug_assert_eq!(fp.category(), category, "fingerprint category mismatch");
                (*fp).clone()
            }
        }
    }

    fn acquire_id(state: &mut EngineState, category: DefectCategory) -> u32 {
        state.next_id += 1;
        state.stats.unique[category.index()] += 1;
        state.next_id
    }

    fn maybe_pause(&self, category: DefectCategory) {
        let pause = match category {
            DefectCategory::UnaddressableAccess => self.config.pause_at_unaddressable,
            DefectCategory::UninitializedRead => self.config.pause_at_uninitialized,
            _ => false,
        };
        if pause {
            if let Some(hook) = &self.pause {
                hook(category);
            }
        }
    }

    /// Best-effort write of a formatted block; output failures degrade
    /// observability but never abort the monitored program
    pub(crate) fn emit(&self, text: &str) {
        if let Err(e) = self.sinks().results.write_all(text.as_bytes()) {
            tracing::warn!("failed to write report output: {e}");
        }
    }

    fn emit_suppress_patterns(&self, category: DefectCategory, stack: &SymbolizedStack) {
        if !self.config.gen_suppress_syms && !self.config.gen_suppress_offs {
            return;
        }
        let mut sinks = self.sinks();
        let Some(out) = sinks.patterns.as_mut() else {
            return;
        };
        let mut text = String::new();
        if self.config.gen_suppress_syms {
            format::render_suppress_pattern(&mut text, category, stack, true);
        }
        if self.config.gen_suppress_offs {
            if self.config.gen_suppress_syms {
                text.push_str("\n# the mod+offs form of the above callstack:\n");
            }
            format::render_suppress_pattern(&mut text, category, stack, false);
        }
        text.push('\n');
        if let Err(e) = out.write_all(text.as_bytes()) {
            tracing::warn!("failed to write suppression pattern: {e}");
        }
    }

    /// Report one non-leak defect.
    ///
    /// The critical sequence (throttle check, dedup, suppression lookup,
    /// counter updates, id assignment) runs under the engine lock;
    /// duplicates only pay a short hold. Formatting and emission happen
    /// afterwards on the calling thread.
    pub fn report_defect(
        &self,
        scratch: &mut ReportScratch,
        report: &DefectReport<'_>,
    ) -> Disposition {
        let category = report.category;
        debug_assert!(!category.is_leak(), "leaks go through report_leak");
        let fingerprint = self.fingerprint(category, &report.stack);

        let mut state = self.state();
        // Throttling is pre-dedup: once the cap is hit even duplicates of
        // already-reported errors are dropped
        if let Some(max) = self.config.report_max {
            if state.stats.reported_errors >= max {
                state.stats.throttled_errors += 1;
                return Disposition::Throttled;
            }
        }

        let (idx, _) = state.store.record(fingerprint);
        let counted = !state.store.get(idx).suppressed;
        if counted {
            state.stats.total[category.index()] += 1;
        }
        if state.store.get(idx).count > 1 {
            // Duplicate: re-apply the stored verdict, no matching or id work
            let (id, suppressed, by_default) = {
                let record = state.store.get(idx);
                (record.id, record.suppressed, record.suppressed_by_default)
            };
            let disposition = Disposition::Duplicate { id, suppressed };
            if suppressed {
                if by_default {
                    state.stats.suppressions_matched_default += 1;
                } else {
                    state.stats.suppressions_matched_user += 1;
                }
                return disposition;
            }
            debug_assert!(id != 0, "duplicate should have an id");
            drop(state);
            // Interactive categories pause at duplicates too
            self.maybe_pause(category);
            return disposition;
        }
        debug_assert_eq!(state.store.get(idx).id, 0, "fresh record should not have an id");

        // First occurrence: symbolize and consult the suppression policy
        let stack = self
            .symbolizer
            .symbolize(state.store.get(idx).fingerprint().frames());
        let instruction = report.instruction.unwrap_or("");
        let state_ref = &mut *state;
        let matched = state_ref.catalog.first_match(
            category,
            &stack.frames,
            instruction,
            0,
            self.config.module_ignore_case,
        );

        if let Some(rule) = matched {
            let by_default = state_ref.catalog.rule(rule).provenance == Provenance::Default;
            let record = state_ref.store.get_mut(idx);
            record.suppressed = true;
            record.suppressed_by_default = by_default;
            record.matched_rule = Some(rule);
            if counted {
                state_ref.stats.total[category.index()] -= 1;
            }
            if by_default {
                state_ref.stats.suppressions_matched_default += 1;
            } else {
                state_ref.stats.suppressions_matched_user += 1;
            }
            let elapsed_ms = state_ref.start.elapsed().as_millis() as u64;
            drop(state);
            if self.config.verbose >= 2 {
                self.emit_defect_block(scratch, report, 0, true, &stack, elapsed_ms);
            }
            return Disposition::Suppressed { by_default };
        }

        let id = Self::acquire_id(state_ref, category);
        state_ref.store.get_mut(idx).id = id;
        state_ref.stats.reported_errors += 1;
        let elapsed_ms = state_ref.start.elapsed().as_millis() as u64;
        drop(state);

        self.emit_defect_block(scratch, report, id, false, &stack, elapsed_ms);
        self.emit_suppress_patterns(category, &stack);
        self.maybe_pause(category);
        Disposition::Reported { id }
    }

    /// Invalid heap argument with the free(NULL) special case: freeing a
    /// null pointer is defined behavior, so it is at most a warning.
    pub fn report_invalid_heap_arg(
        &self,
        scratch: &mut ReportScratch,
        mut report: DefectReport<'_>,
        is_free: bool,
    ) -> Disposition {
        if is_free && report.address == 0 {
            if !self.config.warn_null_ptr {
                return Disposition::Ignored;
            }
            report.category = DefectCategory::Warning;
            report.routine = Some("free() called with NULL pointer");
            return self.report_defect(scratch, &report);
        }
        report.category = DefectCategory::InvalidHeapArgument;
        self.report_defect(scratch, &report)
    }

    /// Report one allocation surfaced by a leak scan.
    ///
    /// Reachable and policy-ignored allocations are counted but bypass
    /// dedup and suppression entirely. Dedup itself only runs when leak
    /// checking is enabled; otherwise every report bumps the unique and
    /// byte counters directly.
    pub fn report_leak(&self, scratch: &mut ReportScratch, report: &LeakReport<'_>) -> Disposition {
        let mut state = self.state();

        let mut label: Option<&'static str> = None;
        if report.reachable {
            state.stats.reachable_leaks += 1;
            if !self.config.show_reachable {
                return Disposition::Ignored;
            }
            label = Some("REACHABLE ");
        } else if !report.known_allocation {
            // Addressable bytes remaining inside a heap region are a
            // curiosity for developers, not an error
            if self.config.verbose < 2 {
                return Disposition::Ignored;
            }
            label = Some("STILL-ADDRESSABLE ");
        }

        if let Some(max) = self.config.report_leak_max {
            if state.stats.total_leaks >= max {
                state.stats.throttled_leaks += 1;
                return Disposition::Throttled;
            }
        }
        state.stats.total_leaks += 1;

        let category = if label.is_some() {
            None
        } else if report.early && !report.reachable && self.config.ignore_early_leaks {
            label = Some("IGNORED ");
            state.stats.leaks_ignored += 1;
            None
        } else if report.maybe_reachable {
            Some(DefectCategory::PossibleLeak)
        } else {
            Some(DefectCategory::Leak)
        };

        let bytes = (report.size + report.indirect_size) as u64;

        if !self.config.check_leaks {
            // No dedup possible: count directly
            if let Some(cat) = category {
                state.stats.unique[cat.index()] += 1;
                if cat == DefectCategory::PossibleLeak {
                    state.stats.bytes_possible_leaked += bytes;
                } else {
                    state.stats.bytes_leaked += bytes;
                }
            }
            drop(state);
            let Some(cat) = category else {
                self.emit_leak_block(scratch, report, label, false, false, None, None, None);
                return Disposition::Ignored;
            };
            if cat == DefectCategory::PossibleLeak && !self.config.possible_leaks {
                return Disposition::Reported { id: 0 };
            }
            self.emit_leak_block(
                scratch,
                report,
                label,
                false,
                cat == DefectCategory::PossibleLeak,
                None,
                None,
                Some(LEAK_STACK_ADVISORY),
            );
            return Disposition::Reported { id: 0 };
        }

        let Some(cat) = category else {
            // Reachable / ignored / still-addressable: counted, never
            // deduplicated or suppressed
            drop(state);
            self.emit_leak_block(scratch, report, label, false, false, None, None, None);
            return Disposition::Ignored;
        };

        let fingerprint = self.fingerprint(cat, &report.stack);
        let (idx, _) = state.store.record(fingerprint);
        let counted = !state.store.get(idx).suppressed;
        if counted {
            state.stats.total[cat.index()] += 1;
        }
        if state.store.get(idx).count > 1 {
            // Duplicate leak: propagate the stored verdict, no output
            let (id, suppressed, by_default, matched_rule) = {
                let record = state.store.get(idx);
                (
                    record.id,
                    record.suppressed,
                    record.suppressed_by_default,
                    record.matched_rule,
                )
            };
            let disposition = Disposition::Duplicate { id, suppressed };
            if suppressed {
                debug_assert!(matched_rule.is_some(), "suppressed record missing its rule");
                if by_default {
                    state.stats.suppressed_leaks_default += 1;
                } else {
                    state.stats.suppressed_leaks_user += 1;
                }
                if let Some(rule) = matched_rule {
                    state.catalog.rule_mut(rule).bytes_leaked += bytes;
                }
            } else if cat == DefectCategory::PossibleLeak {
                state.stats.bytes_possible_leaked += bytes;
            } else {
                state.stats.bytes_leaked += bytes;
            }
            return disposition;
        }

        // First occurrence this scan round (possibly a rescan of a record
        // whose count was reset by revert)
        let stack = self
            .symbolizer
            .symbolize(state.store.get(idx).fingerprint().frames());
        let state_ref = &mut *state;
        let matched = state_ref.catalog.first_match(
            cat,
            &stack.frames,
            "",
            bytes,
            self.config.module_ignore_case,
        );

        if let Some(rule) = matched {
            let by_default = state_ref.catalog.rule(rule).provenance == Provenance::Default;
            let record = state_ref.store.get_mut(idx);
            record.suppressed = true;
            record.suppressed_by_default = by_default;
            record.matched_rule = Some(rule);
            if counted {
                state_ref.stats.total[cat.index()] -= 1;
            }
            if by_default {
                state_ref.stats.suppressed_leaks_default += 1;
            } else {
                state_ref.stats.suppressed_leaks_user += 1;
            }
            drop(state);
            if self.config.verbose >= 2 {
                self.emit_leak_block(
                    scratch,
                    report,
                    None,
                    true,
                    false,
                    None,
                    Some(&stack),
                    None,
                );
            }
            return Disposition::Suppressed { by_default };
        }

        // Identical leaks across scans keep their original id; the unique
        // counter still advances because revert rewound it
        let assign_id = state_ref.store.get(idx).id == 0
            && (cat != DefectCategory::PossibleLeak || self.config.possible_leaks);
        if assign_id {
            state_ref.next_id += 1;
            let fresh = state_ref.next_id;
            state_ref.store.get_mut(idx).id = fresh;
        }
        state_ref.stats.unique[cat.index()] += 1;
        let id = state_ref.store.get(idx).id;
        if cat == DefectCategory::PossibleLeak {
            state_ref.stats.bytes_possible_leaked += bytes;
        } else {
            state_ref.stats.bytes_leaked += bytes;
        }
        drop(state);

        let visible = cat != DefectCategory::PossibleLeak || self.config.possible_leaks;
        if visible {
            self.emit_leak_block(
                scratch,
                report,
                None,
                false,
                cat == DefectCategory::PossibleLeak,
                Some(id),
                Some(&stack),
                None,
            );
        }
        self.emit_suppress_patterns(cat, &stack);
        Disposition::Reported { id }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_leak_block(
        &self,
        scratch: &mut ReportScratch,
        report: &LeakReport<'_>,
        label: Option<&'static str>,
        suppressed: bool,
        possible: bool,
        id: Option<u32>,
        stack: Option<&SymbolizedStack>,
        advisory: Option<&'static str>,
    ) {
        let block = LeakBlock {
            label,
            suppressed,
            possible,
            id,
            address: report.address,
            size: report.size,
            indirect_size: report.indirect_size,
            stack,
            advisory,
        };
        format::render_leak_block(&mut scratch.buf, &block, &self.config);
        self.emit(&scratch.buf);
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_defect_block(
        &self,
        scratch: &mut ReportScratch,
        report: &DefectReport<'_>,
        id: u32,
        suppressed: bool,
        stack: &SymbolizedStack,
        elapsed_ms: u64,
    ) {
        // Heap-proximity notes help localize unaddressable accesses and
        // bad heap arguments; symbol cost stays off the engine lock
        let heap_note = match report.category {
            DefectCategory::UnaddressableAccess | DefectCategory::InvalidHeapArgument => {
                self.heap.as_ref().and_then(|h| {
                    h.describe(
                        report.address,
                        report.size,
                        report.category == DefectCategory::InvalidHeapArgument,
                    )
                })
            }
            DefectCategory::Warning if report.size > 0 => self
                .heap
                .as_ref()
                .and_then(|h| h.describe(report.address, report.size, false)),
            _ => None,
        };
        let block = DefectBlock {
            category: report.category,
            id,
            suppressed,
            address: report.address,
            size: report.size,
            is_write: report.is_write,
            container: report.container,
            routine: report.routine,
            stack,
            instruction: report.instruction,
            thread_id: report.thread_id,
            elapsed_ms,
            heap_note: heap_note.as_deref(),
        };
        format::render_defect_block(&mut scratch.buf, &block, &self.config);
        self.emit(&scratch.buf);
    }

    /// Snapshot every leak-mutated counter for a later revert
    pub fn checkpoint(&self) {
        let mut state = self.state();
        state.saved = state.stats.checkpoint();
    }

    /// Rewind leak accounting to the last checkpoint and mark every leak
    /// record as not-yet-seen, preserving ids, fingerprints, and
    /// suppression verdicts so a rescan re-reports with stable identity.
    pub fn revert(&self) {
        let mut state = self.state();
        let saved = state.saved;
        state.stats.revert(&saved);
        state.store.reset_leak_counts();
    }

    /// Forget all recorded errors and counters for a fork-like restart.
    /// Loaded suppression rules survive.
    pub fn reset(&self) {
        let mut state = self.state();
        state.store.clear();
        state.stats = ReportStats::default();
        state.next_id = 0;
        state.saved = LeakCheckpoint::default();
        state.start = Instant::now();
    }
}
