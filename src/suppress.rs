//! Suppression rules and the two-dialect policy compiler
//!
//! A policy source is line-oriented text. Two block forms are accepted in
//! the same stream: native blocks starting with a category header
//! ("LEAK", "UNADDRESSABLE ACCESS", ...) followed by frame lines, and
//! legacy brace-delimited blocks whose first line is a rule name and second
//! line an imported error-type token. Malformed policy is fatal at load
//! time: partial application could silently under- or over-suppress real
//! defects.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::callstack::SymbolizedFrame;
use crate::category::{DefectCategory, CATEGORY_COUNT};
use crate::pattern::{frames_match, text_matches_pattern, FramePattern};

/// Where a rule came from: shipped default policy or user policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Default,
    User,
}

impl Provenance {
    pub fn label(self) -> &'static str {
        match self {
            Provenance::Default => "default",
            Provenance::User => "user",
        }
    }
}

/// Errors raised while compiling a suppression policy
#[derive(Debug, Error)]
pub enum SuppressionError {
    #[error("malformed suppression:\n{block}\n{reason}")]
    Malformed { block: String, reason: String },

    #[error("failed to read {} suppression file {path}: {source}", .provenance.label())]
    Io {
        path: PathBuf,
        provenance: Provenance,
        source: std::io::Error,
    },
}

const FRAME_SYNTAX_MSG: &str = "The last frame is incorrect!\n\n\
Frames should be one of the following:\n\
 module!function\n\
 <module+0xhexoffset>\n\
 <not in a module>\n\
 system call Name\n\
 ...";

/// One compiled suppression rule
#[derive(Debug, Clone)]
pub struct SuppressionRule {
    /// Category this rule silences
    pub category: DefectCategory,
    /// Load-order number across all sources, used for "<no name N>" display
    pub number: u32,
    /// Optional display name from a `name=` line or a legacy block header
    pub name: Option<String>,
    /// Optional glob restricting the faulting instruction text
    pub instruction: Option<String>,
    /// Ordered frame tokens; non-empty, never ends in an ellipsis
    pub frames: Vec<FramePattern>,
    pub provenance: Provenance,
    /// Times this rule silenced a defect
    pub count_used: u32,
    /// Bytes attributed to this rule (leak categories only)
    pub bytes_leaked: u64,
}

/// Stable handle to a rule inside a [`SuppressionCatalog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleId {
    pub category: DefectCategory,
    pub index: usize,
}

/// Per-category ordered rule lists.
///
/// Built during the single-threaded load phase; append-only afterwards
/// except for the two per-rule counters mutated during matching. Rules keep
/// their declared file order, so the first rule declared wins a tie.
#[derive(Debug, Default)]
pub struct SuppressionCatalog {
    sets: [Vec<SuppressionRule>; CATEGORY_COUNT],
    total_rules: u32,
    depth_warned: bool,
}

/// A block being accumulated by the parser
struct PendingRule {
    category: Option<DefectCategory>,
    name: Option<String>,
    instruction: Option<String>,
    frames: Vec<FramePattern>,
    /// Counts every frame line seen, including ones dropped by the depth cap
    frame_lines: usize,
    /// Raw block text echoed in diagnostics
    raw: Vec<String>,
}

impl PendingRule {
    fn new(category: Option<DefectCategory>, header: &str) -> Self {
        Self {
            category,
            name: None,
            instruction: None,
            frames: Vec::new(),
            frame_lines: 0,
            raw: vec![header.to_string()],
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> SuppressionError {
        SuppressionError::Malformed {
            block: self.raw.join("\n"),
            reason: reason.into(),
        }
    }
}

impl SuppressionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rules recorded across every category and source
    pub fn len(&self) -> u32 {
        self.total_rules
    }

    pub fn is_empty(&self) -> bool {
        self.total_rules == 0
    }

    /// Rules for one category in declaration order
    pub fn rules(&self, category: DefectCategory) -> &[SuppressionRule] {
        &self.sets[category.index()]
    }

    pub fn rule(&self, id: RuleId) -> &SuppressionRule {
        &self.sets[id.category.index()][id.index]
    }

    pub(crate) fn rule_mut(&mut self, id: RuleId) -> &mut SuppressionRule {
        &mut self.sets[id.category.index()][id.index]
    }

    /// All rules, category-major, declaration order within each category
    pub fn iter(&self) -> impl Iterator<Item = &SuppressionRule> {
        self.sets.iter().flatten()
    }

    /// Compile policy text and append its rules. Returns the number of
    /// rules recorded from this source.
    pub fn load_str(
        &mut self,
        text: &str,
        provenance: Provenance,
        max_frames: usize,
    ) -> Result<u32, SuppressionError> {
        let before = self.total_rules;
        let mut pending: Option<PendingRule> = None;
        // -1 outside a legacy block, otherwise the line number inside it
        let mut brace_line: i32 = -1;

        for raw_line in text.lines() {
            let line = raw_line
                .trim_end_matches(['\r', ' ', '\t'])
                .trim_start_matches([' ', '\t']);
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            tracing::trace!(line, "suppression source line");

            let mut starts_block = false;
            let mut block_category: Option<DefectCategory> = None;
            if brace_line == -1 {
                if let Some(cat) = DefectCategory::from_header_prefix(line) {
                    starts_block = true;
                    block_category = Some(cat);
                } else if line.starts_with('{') {
                    starts_block = true;
                    brace_line = 0;
                }
            } else if line.starts_with('}') {
                brace_line = -1;
                continue;
            } else {
                brace_line += 1;
            }

            if starts_block {
                if let Some(done) = pending.take() {
                    self.finish(done, provenance)?;
                }
                pending = Some(PendingRule::new(block_category, line));
            } else if let Some(rule) = pending.as_mut() {
                rule.raw.push(line.to_string());
                self.add_line(rule, line, brace_line, max_frames)?;
            } else {
                return Err(SuppressionError::Malformed {
                    block: line.to_string(),
                    reason: FRAME_SYNTAX_MSG.to_string(),
                });
            }
        }
        if let Some(done) = pending.take() {
            self.finish(done, provenance)?;
        }
        Ok(self.total_rules - before)
    }

    /// Compile a policy file and append its rules
    pub fn load_file(
        &mut self,
        path: &Path,
        provenance: Provenance,
        max_frames: usize,
    ) -> Result<u32, SuppressionError> {
        let text = std::fs::read_to_string(path).map_err(|source| SuppressionError::Io {
            path: path.to_path_buf(),
            provenance,
            source,
        })?;
        let added = self.load_str(&text, provenance, max_frames)?;
        tracing::info!(
            "recorded {} suppression(s) from {} {}",
            added,
            provenance.label(),
            path.display()
        );
        Ok(added)
    }

    /// First rule in the category's set matching the symbolized stack.
    ///
    /// Bumps the winning rule's usage counter and, when searching a leak
    /// set, adds `leaked_bytes` to its accumulated total. Possible leaks
    /// that miss their own set retry against the definite-leak set; the
    /// fallback is one-directional.
    pub fn first_match(
        &mut self,
        category: DefectCategory,
        frames: &[SymbolizedFrame],
        instruction: &str,
        leaked_bytes: u64,
        module_ignore_case: bool,
    ) -> Option<RuleId> {
        if let Some(id) =
            self.first_match_in(category, frames, instruction, leaked_bytes, module_ignore_case)
        {
            return Some(id);
        }
        if category == DefectCategory::PossibleLeak {
            return self.first_match_in(
                DefectCategory::Leak,
                frames,
                instruction,
                leaked_bytes,
                module_ignore_case,
            );
        }
        None
    }

    fn first_match_in(
        &mut self,
        set: DefectCategory,
        frames: &[SymbolizedFrame],
        instruction: &str,
        leaked_bytes: u64,
        module_ignore_case: bool,
    ) -> Option<RuleId> {
        for (index, rule) in self.sets[set.index()].iter_mut().enumerate() {
            // Cheap rejection before any frame comparison
            if let Some(filter) = &rule.instruction {
                if !text_matches_pattern(instruction, filter, false) {
                    continue;
                }
            }
            if frames_match(frames, &rule.frames, module_ignore_case) {
                tracing::debug!(
                    rule = rule.name.as_deref().unwrap_or("<no name>"),
                    number = rule.number,
                    "matched suppression"
                );
                rule.count_used += 1;
                if set.is_leak() {
                    rule.bytes_leaked += leaked_bytes;
                }
                return Some(RuleId {
                    category: set,
                    index,
                });
            }
        }
        None
    }

    fn finish(
        &mut self,
        rule: PendingRule,
        provenance: Provenance,
    ) -> Result<(), SuppressionError> {
        let Some(category) = rule.category else {
            return Err(rule.malformed("The suppression is missing its error type"));
        };
        if rule.frames.is_empty() || matches!(rule.frames.last(), Some(FramePattern::Ellipsis)) {
            return Err(rule.malformed("The given suppression ends with '...'"));
        }
        let number = self.total_rules;
        tracing::debug!(number, category = category.header(), "added suppression");
        self.sets[category.index()].push(SuppressionRule {
            category,
            number,
            name: rule.name,
            instruction: rule.instruction,
            frames: rule.frames,
            provenance,
            count_used: 0,
            bytes_leaked: 0,
        });
        self.total_rules += 1;
        Ok(())
    }

    /// Handle one line inside a block: either a prefix line (name, legacy
    /// type, instruction filter) or a frame line.
    fn add_line(
        &mut self,
        rule: &mut PendingRule,
        line: &str,
        brace_line: i32,
        max_frames: usize,
    ) -> Result<(), SuppressionError> {
        if brace_line == 1 {
            rule.name = Some(line.to_string());
            return Ok(());
        }
        if brace_line == 2 {
            rule.category = Some(legacy_category(line).ok_or_else(|| {
                rule.malformed("Unknown legacy error type")
            })?);
            return Ok(());
        }
        if let Some(name) = line.strip_prefix("name=") {
            rule.name = Some(name.to_string());
            return Ok(());
        }
        if let Some(filter) = line.strip_prefix("instruction=") {
            return match rule.category {
                Some(
                    DefectCategory::UnaddressableAccess
                    | DefectCategory::UninitializedRead
                    | DefectCategory::Warning,
                ) => {
                    rule.instruction = Some(filter.to_string());
                    Ok(())
                }
                _ => Err(rule.malformed(
                    "Only unaddressable accesses, uninitialized reads, and warnings \
                     can specify an instruction= field",
                )),
            };
        }

        // Depth cap: frames past the configured maximum are dropped so
        // rules cannot be deeper than any stack the engine will capture.
        rule.frame_lines += 1;
        if rule.frame_lines >= max_frames {
            if !self.depth_warned {
                tracing::warn!("requested max frames truncates suppression callstacks");
                self.depth_warned = true;
            }
            return Ok(());
        }

        // Inside the braces frames use the legacy forms; once the block is
        // closed any stragglers fall back to the native grammar.
        let frame = if brace_line > -1 {
            parse_legacy_frame(line).ok_or_else(|| {
                rule.malformed("Unknown frame in legacy-style callstack")
            })?
        } else {
            parse_native_frame(line)
                .map_err(|()| rule.malformed(FRAME_SYNTAX_MSG))?
        };
        rule.frames.push(frame);
        Ok(())
    }
}

/// Fixed mapping from imported legacy error-type tokens
fn legacy_category(line: &str) -> Option<DefectCategory> {
    if line.starts_with("Memcheck:Addr") || line == "Memcheck:Jump" {
        // The size digit after Addr is ignored
        Some(DefectCategory::UnaddressableAccess)
    } else if line.starts_with("Memcheck:Value")
        || line == "Memcheck:Cond"
        || line == "Memcheck:Param"
    {
        Some(DefectCategory::UninitializedRead)
    } else if line == "Memcheck:Leak" {
        Some(DefectCategory::Leak)
    } else if line == "Memcheck:Free" {
        Some(DefectCategory::InvalidHeapArgument)
    } else if line == "Memcheck:Overlap" {
        Some(DefectCategory::Warning)
    } else {
        None
    }
}

/// Legacy frame lines: `fun:NAME` matches NAME in any module, `obj:MODULE`
/// matches any function inside MODULE.
fn parse_legacy_frame(line: &str) -> Option<FramePattern> {
    if let Some(function) = line.strip_prefix("fun:") {
        Some(FramePattern::ModuleFunction {
            module: "*".to_string(),
            function: function.to_string(),
        })
    } else {
        line.strip_prefix("obj:").map(|module| FramePattern::ModuleFunction {
            module: module.to_string(),
            function: "*".to_string(),
        })
    }
}

/// Native frame-line grammar, one frame per line
fn parse_native_frame(line: &str) -> Result<FramePattern, ()> {
    if line.contains('!') && !line.contains('+') && !line.starts_with('<') {
        let (module, function) = line.split_once('!').ok_or(())?;
        return Ok(FramePattern::ModuleFunction {
            module: module.to_string(),
            function: function.to_string(),
        });
    }
    if line.starts_with('<') && line.contains('+') && line.contains('>') && !line.contains('!') {
        let plus = line.find('+').ok_or(())?;
        let close = line.find('>').ok_or(())?;
        if close <= plus {
            return Err(());
        }
        let module = &line[1..plus];
        let offset = &line[plus + 1..close];
        if offset.len() < 3 || !offset.starts_with("0x") {
            return Err(());
        }
        return Ok(FramePattern::ModuleOffset {
            module: module.to_string(),
            offset: offset.to_string(),
        });
    }
    if line == "<not in a module>" {
        return Ok(FramePattern::Literal(line.to_string()));
    }
    if line == "..." {
        return Ok(FramePattern::Ellipsis);
    }
    if line.contains("system call ") {
        return Ok(FramePattern::Literal(line.to_string()));
    }
    Err(())
}
