//! Callstack fingerprints and the symbolized stack model
//!
//! A fingerprint is the canonical (category, raw frame addresses) key used
//! for deduplication. Symbol resolution is an external concern: the engine
//! hands raw addresses to a [`Symbolizer`] implementation and matches
//! suppressions against the symbolized result.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::category::DefectCategory;

/// Canonical dedup key for a captured callstack.
///
/// Equality and hashing cover ONLY the category and the raw frame sequence.
/// The mutable bookkeeping on a stored record (id, count, suppression
/// verdict) must never participate, since those fields are not known at
/// lookup time for a first occurrence.
///
/// Frames are shared (`Arc`) because capture lifetimes differ from storage
/// lifetimes: the detector may pass a fingerprint it owns, and the store
/// keeps its own handle.
#[derive(Debug, Clone)]
pub struct CallstackFingerprint {
    category: DefectCategory,
    frames: Arc<[u64]>,
}

impl CallstackFingerprint {
    /// Build a fingerprint from raw captured return addresses
    pub fn new(category: DefectCategory, frames: &[u64]) -> Self {
        Self {
            category,
            frames: frames.into(),
        }
    }

    pub fn category(&self) -> DefectCategory {
        self.category
    }

    /// Raw frame addresses, top of stack first
    pub fn frames(&self) -> &[u64] {
        &self.frames
    }
}

impl PartialEq for CallstackFingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category && self.frames == other.frames
    }
}

impl Eq for CallstackFingerprint {}

impl Hash for CallstackFingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.category.hash(state);
        self.frames.hash(state);
    }
}

/// One frame after symbol resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolizedFrame {
    /// Frame attributed to a loaded module
    Module {
        /// Module (shared object / executable) name
        module: String,
        /// Offset of the frame address from the module base
        offset: u64,
        /// Function name when the symbolizer resolved one
        function: Option<String>,
    },
    /// Frame outside any module, or a synthetic marker such as
    /// "system call NtCreateFile"
    Text(String),
}

impl SymbolizedFrame {
    /// Hex offset text compared against `<module+0xoffset>` patterns
    pub fn offset_text(&self) -> Option<String> {
        match self {
            SymbolizedFrame::Module { offset, .. } => Some(format!("{offset:#x}")),
            SymbolizedFrame::Text(_) => None,
        }
    }
}

/// A fully symbolized callstack, top of stack first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolizedStack {
    pub frames: Vec<SymbolizedFrame>,
}

impl SymbolizedStack {
    pub fn new(frames: Vec<SymbolizedFrame>) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Boundary to the external symbol-resolution backend.
///
/// Implementations map raw frame addresses to module/function/offset
/// triples. The engine calls this once per first occurrence, never for
/// duplicates.
pub trait Symbolizer: Send + Sync {
    fn symbolize(&self, frames: &[u64]) -> SymbolizedStack;
}
