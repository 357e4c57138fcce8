//! Report-block and suppression-pattern rendering
//!
//! Formatting happens outside the engine lock, into a scratch buffer owned
//! by the reporting thread, so symbol printing never serializes other
//! threads. The engine captures everything a block needs while it holds the
//! lock and hands it here afterwards.

use std::fmt::Write as _;

use crate::callstack::{SymbolizedFrame, SymbolizedStack};
use crate::category::DefectCategory;
use crate::config::ReportConfig;

/// Marker terminating every report block
pub const END_MARKER: &str = "\n";

/// Prefix for auxiliary note lines inside a block
pub const NOTE_PREFIX: &str = "Note: ";

/// Per-thread scratch buffer for report formatting.
///
/// Passed explicitly to every reporting call; reusing one per thread keeps
/// block formatting allocation-free in the steady state.
#[derive(Debug, Default)]
pub struct ReportScratch {
    pub(crate) buf: String,
}

impl ReportScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last block rendered into this scratch
    pub fn last_block(&self) -> &str {
        &self.buf
    }
}

/// Everything needed to render one non-leak defect block
pub(crate) struct DefectBlock<'a> {
    pub category: DefectCategory,
    pub id: u32,
    pub suppressed: bool,
    pub address: u64,
    pub size: usize,
    pub is_write: bool,
    pub container: Option<(u64, u64)>,
    pub routine: Option<&'a str>,
    pub stack: &'a SymbolizedStack,
    pub instruction: Option<&'a str>,
    pub thread_id: u64,
    pub elapsed_ms: u64,
    pub heap_note: Option<&'a str>,
}

/// Everything needed to render one leak block
pub(crate) struct LeakBlock<'a> {
    pub label: Option<&'static str>,
    pub suppressed: bool,
    pub possible: bool,
    pub id: Option<u32>,
    pub address: u64,
    pub size: usize,
    pub indirect_size: usize,
    pub stack: Option<&'a SymbolizedStack>,
    /// Shown instead of a stack when leak callstacks are unavailable
    pub advisory: Option<&'a str>,
}

pub(crate) fn render_defect_block(buf: &mut String, block: &DefectBlock<'_>, config: &ReportConfig) {
    buf.clear();
    if block.suppressed {
        buf.push_str("SUPPRESSED ");
    }
    let _ = write!(buf, "Error #{}: ", block.id);
    match block.category {
        DefectCategory::UnaddressableAccess => {
            let _ = write!(
                buf,
                "UNADDRESSABLE ACCESS: {}",
                if block.is_write { "writing " } else { "reading " }
            );
            if !config.brief {
                let _ = write!(
                    buf,
                    "{:#010x}-{:#010x} ",
                    block.address,
                    block.address + block.size as u64
                );
            }
            let _ = write!(buf, "{} byte(s)", block.size);
            write_container(buf, block, config);
        }
        DefectCategory::UninitializedRead => {
            buf.push_str("UNINITIALIZED READ: reading ");
            if !config.brief {
                let _ = write!(
                    buf,
                    "{:#010x}-{:#010x} ",
                    block.address,
                    block.address + block.size as u64
                );
            }
            let _ = write!(buf, "{} byte(s)", block.size);
            write_container(buf, block, config);
        }
        DefectCategory::InvalidHeapArgument => {
            let _ = write!(
                buf,
                "INVALID HEAP ARGUMENT to {}()",
                block.routine.unwrap_or("?")
            );
            if !config.brief {
                let _ = write!(buf, " {:#010x}", block.address);
            }
            buf.push('\n');
        }
        DefectCategory::Warning => {
            let _ = writeln!(buf, "WARNING: {}", block.routine.unwrap_or(""));
        }
        DefectCategory::Leak | DefectCategory::PossibleLeak => {
            debug_assert!(false, "leaks are rendered by render_leak_block");
        }
    }

    write_stack(buf, block.stack);

    if !config.brief {
        let _ = write!(buf, "{NOTE_PREFIX}");
        write_elapsed(buf, block.elapsed_ms);
        let _ = writeln!(buf, " in thread {}", block.thread_id);
    }
    if let Some(note) = block.heap_note {
        for line in note.lines() {
            let _ = writeln!(buf, "{NOTE_PREFIX}{line}");
        }
    }
    if !config.brief {
        if let Some(instruction) = block.instruction {
            if !instruction.is_empty() {
                let _ = writeln!(buf, "{NOTE_PREFIX}instruction: {instruction}");
            }
        }
    }
    buf.push_str(END_MARKER);
}

pub(crate) fn render_leak_block(buf: &mut String, block: &LeakBlock<'_>, config: &ReportConfig) {
    buf.clear();
    if let Some(id) = block.id {
        let _ = write!(buf, "Error #{id}: ");
    }
    if let Some(label) = block.label {
        buf.push_str(label);
    }
    if block.suppressed {
        buf.push_str("SUPPRESSED ");
    } else if block.possible {
        buf.push_str("POSSIBLE ");
    }
    let _ = write!(buf, "LEAK {} ", block.size);
    if block.indirect_size > 0 || !config.brief {
        buf.push_str("direct ");
    }
    buf.push_str("bytes ");
    if !config.brief {
        let _ = write!(
            buf,
            "{:#010x}-{:#010x} ",
            block.address,
            block.address + block.size as u64
        );
    }
    if block.indirect_size > 0 || !config.brief {
        let _ = write!(buf, "+ {} indirect bytes", block.indirect_size);
    }
    buf.push('\n');
    if let Some(stack) = block.stack {
        write_stack(buf, stack);
    } else if let Some(advisory) = block.advisory {
        let _ = writeln!(buf, "   {advisory}");
    }
    buf.push_str(END_MARKER);
}

fn write_container(buf: &mut String, block: &DefectBlock<'_>, config: &ReportConfig) {
    // Container range only matters for large operations or partial overlap
    if !config.brief {
        if let Some((start, end)) = block.container {
            let addr_end = block.address + block.size as u64;
            if end.saturating_sub(start) > 8 || block.address > start || addr_end < end {
                debug_assert!(end > start, "invalid container range");
                let _ = writeln!(buf, " within {start:#010x}-{end:#010x}");
                return;
            }
        }
    }
    buf.push('\n');
}

/// Print a symbolized stack, one frame per line, top of stack first
pub(crate) fn write_stack(buf: &mut String, stack: &SymbolizedStack) {
    for (i, frame) in stack.frames.iter().enumerate() {
        match frame {
            SymbolizedFrame::Module {
                module,
                offset,
                function: Some(function),
            } => {
                let _ = writeln!(buf, "#{i:2} {module}!{function} +{offset:#x}");
            }
            SymbolizedFrame::Module {
                module,
                offset,
                function: None,
            } => {
                let _ = writeln!(buf, "#{i:2} <{module}+{offset:#x}>");
            }
            SymbolizedFrame::Text(text) => {
                let _ = writeln!(buf, "#{i:2} {text}");
            }
        }
    }
}

fn write_elapsed(buf: &mut String, elapsed_ms: u64) {
    let msec = elapsed_ms % 1000;
    let abssec = elapsed_ms / 1000;
    let sec = abssec % 60;
    let mut min = abssec / 60;
    let hour = min / 60;
    min %= 60;
    let _ = write!(buf, "@{hour}:{min:02}:{sec:02}.{msec:03}");
}

/// Render a ready-to-load suppression block for an unmatched callstack.
///
/// With `symbolic` the frames use the `module!function` form (unresolved
/// functions widen to `*`); otherwise the `<module+0xoffset>` form.
pub(crate) fn render_suppress_pattern(
    buf: &mut String,
    category: DefectCategory,
    stack: &SymbolizedStack,
    symbolic: bool,
) {
    let _ = writeln!(buf, "{}", category.header());
    for frame in &stack.frames {
        match frame {
            SymbolizedFrame::Module {
                module,
                offset,
                function,
            } => {
                if symbolic {
                    let function = match function.as_deref() {
                        // An unresolved "?" widens to match anything
                        Some("?") | None => "*",
                        Some(f) => f,
                    };
                    let _ = writeln!(buf, "{module}!{function}");
                } else {
                    let _ = writeln!(buf, "<{module}+{offset:#x}>");
                }
            }
            SymbolizedFrame::Text(text) => {
                let _ = writeln!(buf, "{text}");
            }
        }
    }
}
