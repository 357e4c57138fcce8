//! Wildcard comparison primitives and frame-sequence matching
//!
//! Text comparison supports `*` (any run, including empty) and `?` (any
//! single byte). Frame-sequence matching generalizes the same two-cursor
//! backtracking from characters to frame tokens, with `...` playing the
//! role of `*` over whole stack frames.

use crate::callstack::SymbolizedFrame;

/// One matchable element of a suppression rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePattern {
    /// `...`: matches zero or more consecutive real frames
    Ellipsis,
    /// `<module+0xoffset>`: module name glob plus hex offset glob
    ModuleOffset { module: String, offset: String },
    /// `module!function`: module name glob plus function name glob
    ModuleFunction { module: String, function: String },
    /// Bare text such as `<not in a module>` or `system call NAME`
    Literal(String),
}

/// Glob comparison of `text` against `pattern`.
///
/// Only `*` and `?` are special; everything else compares byte-for-byte,
/// optionally case-folded (ASCII).
pub fn text_matches_pattern(text: &str, pattern: &str, ignore_case: bool) -> bool {
    let text = text.as_bytes();
    let pattern = pattern.as_bytes();
    let fold = |b: u8| if ignore_case { b.to_ascii_lowercase() } else { b };

    let mut ti = 0;
    let mut pi = 0;
    // Most recent '*': (pattern index after it, text index it anchors)
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        if pi < pattern.len() && pattern[pi] == b'*' {
            star = Some((pi + 1, ti));
            pi += 1;
        } else if pi < pattern.len()
            && (pattern[pi] == b'?' || fold(pattern[pi]) == fold(text[ti]))
        {
            ti += 1;
            pi += 1;
        } else if let Some((after_star, anchor)) = star {
            // Retry the suffix one byte further into the text
            pi = after_star;
            ti = anchor + 1;
            star = Some((after_star, anchor + 1));
        } else {
            return false;
        }
    }
    while pi < pattern.len() && pattern[pi] == b'*' {
        pi += 1;
    }
    pi == pattern.len()
}

/// Compare one symbolized frame against one non-ellipsis pattern token.
///
/// Case policy: module names follow `module_ignore_case` (platform
/// dependent), function names always compare case-sensitively, hex offsets
/// always ignore case.
pub fn frame_matches(
    frame: &SymbolizedFrame,
    pattern: &FramePattern,
    module_ignore_case: bool,
) -> bool {
    match pattern {
        // Ellipsis is consumed by the sequence matcher, never compared here
        FramePattern::Ellipsis => false,
        FramePattern::Literal(text) => match frame {
            SymbolizedFrame::Text(s) => text_matches_pattern(s, text, false),
            SymbolizedFrame::Module { .. } => false,
        },
        FramePattern::ModuleOffset { module, offset } => match frame {
            SymbolizedFrame::Module {
                module: frame_module,
                offset: frame_offset,
                ..
            } => {
                text_matches_pattern(frame_module, module, module_ignore_case)
                    && text_matches_pattern(&format!("{frame_offset:#x}"), offset, true)
            }
            SymbolizedFrame::Text(_) => false,
        },
        FramePattern::ModuleFunction { module, function } => match frame {
            SymbolizedFrame::Module {
                module: frame_module,
                function: Some(frame_function),
                ..
            } => {
                text_matches_pattern(frame_module, module, module_ignore_case)
                    && text_matches_pattern(frame_function, function, false)
            }
            _ => false,
        },
    }
}

/// Match a symbolized stack against a rule's frame sequence.
///
/// A rule is a prefix pattern: once every rule token is consumed the match
/// succeeds regardless of remaining captured frames. `...` matches zero or
/// more frames with classic wildcard backtracking; consecutive ellipses
/// collapse into one. The parser guarantees the sequence is non-empty and
/// does not end in an ellipsis.
pub fn frames_match(
    frames: &[SymbolizedFrame],
    patterns: &[FramePattern],
    module_ignore_case: bool,
) -> bool {
    let mut i = 0; // captured-frame cursor
    let mut j = 0; // pattern cursor
    // Most recent ellipsis: (captured anchor, pattern index after ellipsis)
    let mut backtrack: Option<(usize, usize)> = None;

    while i < frames.len() {
        if j == patterns.len() {
            // Prefix match: rule exhausted with captured frames remaining
            return true;
        }
        if matches!(patterns[j], FramePattern::Ellipsis) {
            while j < patterns.len() && matches!(patterns[j], FramePattern::Ellipsis) {
                j += 1;
            }
            debug_assert!(j < patterns.len(), "rule ends with '...'");
            backtrack = Some((i, j));
        } else if frame_matches(&frames[i], &patterns[j], module_ignore_case) {
            i += 1;
            j += 1;
        } else if let Some((anchor, after_ellipsis)) = backtrack {
            // Retry the rule suffix one captured frame later
            i = anchor + 1;
            j = after_ellipsis;
            backtrack = Some((anchor + 1, after_ellipsis));
        } else {
            return false;
        }
    }
    // Captured frames exhausted: success only if the rule is too
    j == patterns.len()
}
