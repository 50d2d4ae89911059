use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::node::NodeId;

/// What the dialogue remembers about one node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub value: Value,
    pub confirmed: bool,
}

/// Independent attempt counters for one node, one per failure type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptCounters {
    pub no_match: u32,
    pub no_input: u32,
    pub not_confirmed: u32,
}

/// Mutable state of one in-flight dialogue run.
///
/// Created once per session, owned by exactly one run, never persisted and
/// never shared across sessions. Only the state machine mutates it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogueState {
    memory: BTreeMap<NodeId, MemoryEntry>,
    counters: BTreeMap<NodeId, AttemptCounters>,
}

impl DialogueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&mut self, id: &NodeId, value: Value, confirmed: bool) {
        self.memory.insert(id.clone(), MemoryEntry { value, confirmed });
    }

    pub fn entry(&self, id: &NodeId) -> Option<&MemoryEntry> {
        self.memory.get(id)
    }

    /// A node counts as filled once it holds a non-null value. Null stands
    /// for "undefined" and is treated the same as no entry at all.
    pub fn is_filled(&self, id: &NodeId) -> bool {
        self.memory.get(id).map(|entry| !entry.value.is_null()).unwrap_or(false)
    }

    pub fn mark_confirmed(&mut self, id: &NodeId) {
        if let Some(entry) = self.memory.get_mut(id) {
            entry.confirmed = true;
        }
    }

    pub fn counters(&self, id: &NodeId) -> AttemptCounters {
        self.counters.get(id).copied().unwrap_or_default()
    }

    pub fn counters_mut(&mut self, id: &NodeId) -> &mut AttemptCounters {
        self.counters.entry(id.clone()).or_default()
    }

    /// Whole-run recovery totals, summed over every node.
    pub fn counter_totals(&self) -> AttemptCounters {
        self.counters.values().fold(AttemptCounters::default(), |mut totals, counters| {
            totals.no_match += counters.no_match;
            totals.no_input += counters.no_input;
            totals.not_confirmed += counters.not_confirmed;
            totals
        })
    }
}
