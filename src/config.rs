//! Engine configuration
//!
//! All policy knobs the aggregator consults at report time. The defaults
//! mirror a production run: dedup and leak checking on, reachable
//! allocations hidden, generous throttling caps.

/// Tunable policy for the report engine
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Cap on reported (non-leak) errors; `None` disables throttling
    pub report_max: Option<u32>,
    /// Cap on leak reports counted toward totals; `None` disables throttling
    pub report_leak_max: Option<u32>,
    /// Deduplicate and suppress leaks (otherwise only count them)
    pub check_leaks: bool,
    /// Give possible leaks ids and report blocks
    pub possible_leaks: bool,
    /// Report still-reachable allocations as defects
    pub show_reachable: bool,
    /// Drop allocations made before instrumentation attached
    pub ignore_early_leaks: bool,
    /// Downgrade free(NULL) to a warning instead of dropping it
    pub warn_null_ptr: bool,
    /// Omit addresses and auxiliary notes from report blocks
    pub brief: bool,
    /// Verbosity: at 2+ suppressed defects still produce output
    pub verbose: u8,
    /// Emit `module!function` suppression patterns for unmatched defects
    pub gen_suppress_syms: bool,
    /// Emit `<module+0xoffset>` suppression patterns for unmatched defects
    pub gen_suppress_offs: bool,
    /// Invoke the pause hook when an unaddressable access is reported
    pub pause_at_unaddressable: bool,
    /// Invoke the pause hook when an uninitialized read is reported
    pub pause_at_uninitialized: bool,
    /// Maximum callstack depth; deeper suppression frames are dropped
    pub max_frames: usize,
    /// Compare module names case-insensitively (platform convention)
    pub module_ignore_case: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            report_max: Some(20000),
            report_leak_max: Some(10000),
            check_leaks: true,
            possible_leaks: true,
            show_reachable: false,
            ignore_early_leaks: true,
            warn_null_ptr: false,
            brief: false,
            verbose: 1,
            gen_suppress_syms: true,
            gen_suppress_offs: false,
            pause_at_unaddressable: false,
            pause_at_uninitialized: false,
            max_frames: 20,
            module_ignore_case: cfg!(windows),
        }
    }
}
