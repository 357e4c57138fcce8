//! Recorded defect traces for offline replay
//!
//! The replay binary consumes JSON-lines traces: one event per line, each
//! either a defect, a leak-scan result, or a checkpoint/revert marker.
//! Frames carry their own symbol information, so a trace doubles as the
//! symbol source: [`TraceSymbolizer`] learns every frame up front and then
//! serves the engine's symbolization requests from that map.

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::callstack::{SymbolizedFrame, SymbolizedStack, Symbolizer};
use crate::category::DefectCategory;

/// One captured frame with optional symbol information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceFrame {
    /// Raw return address; the dedup key
    pub address: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Bare text for frames outside any module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl TraceFrame {
    pub fn to_symbolized(&self) -> SymbolizedFrame {
        match &self.module {
            Some(module) => SymbolizedFrame::Module {
                module: module.clone(),
                offset: self.offset.unwrap_or(self.address),
                function: self.function.clone(),
            },
            None => SymbolizedFrame::Text(
                self.text
                    .clone()
                    .unwrap_or_else(|| "<not in a module>".to_string()),
            ),
        }
    }
}

fn default_true() -> bool {
    true
}

/// One replayable event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    /// Non-leak defect from the detector
    Defect {
        category: DefectCategory,
        address: u64,
        #[serde(default)]
        size: usize,
        #[serde(default)]
        is_write: bool,
        #[serde(default)]
        container: Option<(u64, u64)>,
        #[serde(default)]
        instruction: Option<String>,
        #[serde(default)]
        routine: Option<String>,
        #[serde(default)]
        thread: u64,
        frames: Vec<TraceFrame>,
    },
    /// One allocation surfaced by a leak scan
    Leak {
        #[serde(default = "default_true")]
        known_allocation: bool,
        address: u64,
        size: usize,
        #[serde(default)]
        indirect_size: usize,
        #[serde(default)]
        early: bool,
        #[serde(default)]
        reachable: bool,
        #[serde(default)]
        maybe_reachable: bool,
        frames: Vec<TraceFrame>,
    },
    /// Snapshot leak accounting before a scan
    Checkpoint,
    /// Rewind leak accounting to the last checkpoint
    Revert,
}

impl TraceEvent {
    pub fn frames(&self) -> &[TraceFrame] {
        match self {
            TraceEvent::Defect { frames, .. } | TraceEvent::Leak { frames, .. } => frames,
            TraceEvent::Checkpoint | TraceEvent::Revert => &[],
        }
    }
}

/// Symbolizer backed by the frames recorded in a trace.
///
/// Useful for replay and tests: feed it every frame up front, then hand it
/// to the engine as the symbol backend.
#[derive(Debug, Default)]
pub struct TraceSymbolizer {
    frames: FnvHashMap<u64, SymbolizedFrame>,
}

impl TraceSymbolizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the symbol information carried by these frames
    pub fn learn(&mut self, frames: &[TraceFrame]) {
        for frame in frames {
            self.frames
                .entry(frame.address)
                .or_insert_with(|| frame.to_symbolized());
        }
    }

    /// Map one address directly (test convenience)
    pub fn insert(&mut self, address: u64, frame: SymbolizedFrame) {
        self.frames.insert(address, frame);
    }

    /// Build a symbolizer knowing every frame in a trace
    pub fn from_events(events: &[TraceEvent]) -> Self {
        let mut sym = Self::new();
        for event in events {
            sym.learn(event.frames());
        }
        sym
    }
}

impl Symbolizer for TraceSymbolizer {
    fn symbolize(&self, frames: &[u64]) -> SymbolizedStack {
        SymbolizedStack::new(
            frames
                .iter()
                .map(|addr| {
                    self.frames
                        .get(addr)
                        .cloned()
                        .unwrap_or_else(|| SymbolizedFrame::Text("<not in a module>".to_string()))
                })
                .collect(),
        )
    }
}
