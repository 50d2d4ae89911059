//! Escalation resolution: which recovery prompt plays at a given attempt
//! level, clamped so attempts past the authored levels repeat the last one.

use crate::domain::node::DialogueNode;
use crate::domain::script::{Escalation, StepScript, StepType};

/// Resolve the escalation for a 1-based attempt level. Exceeding the
/// authored count clamps to the last defined escalation; an empty ladder
/// resolves to nothing.
pub fn resolve_escalation(script: &StepScript, attempt: u32) -> Option<&Escalation> {
    if script.escalations.is_empty() {
        return None;
    }
    let index = (attempt.max(1) as usize - 1).min(script.escalations.len() - 1);
    script.escalations.get(index)
}

/// Locate a node's script for `step` and resolve the attempt level in one
/// go. Returns `None` both when the script is absent and when its ladder is
/// empty; callers decide whether that is a fallback or a hard failure.
pub fn resolve_step(node: &DialogueNode, step: StepType, attempt: u32) -> Option<&Escalation> {
    node.step(step).and_then(|script| resolve_escalation(script, attempt))
}
