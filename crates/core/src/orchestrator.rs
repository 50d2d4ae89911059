//! Tree navigation: walks a dialogue tree depth-first, runs each node's
//! retrieval, and composes the final value from memory.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::compose::compose_node;
use crate::domain::node::{DialogueNode, DialogueTree, TreeContext, TreeKind};
use crate::errors::EngineError;
use crate::machine::{retrieve, EventSource, MessageSink, RetrieveOutcome};
use crate::memory::DialogueState;

/// How a whole dialogue run ended.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    /// Every reachable required node was visited; `value` is the composed
    /// result (an array for collection trees).
    Completed { value: Value },
    /// An exit task or exit event terminated the run early.
    Exited { action: String },
}

/// A complete dialogue runner. The local implementation walks the tree in
/// this process; the remote one delegates turns to a session server.
#[async_trait]
pub trait DialogueEngine: Send + Sync {
    async fn run(
        &self,
        tree: &DialogueTree,
        state: &mut DialogueState,
        events: &dyn EventSource,
        messages: &dyn MessageSink,
    ) -> Result<RunOutcome, EngineError>;
}

/// In-process engine: navigate the tree, retrieve every required node,
/// compose the result.
#[derive(Debug, Default)]
pub struct LocalEngine;

impl LocalEngine {
    pub fn new() -> Self {
        Self
    }
}

enum NodeStatus {
    Done,
    Exited(String),
}

#[async_trait]
impl DialogueEngine for LocalEngine {
    async fn run(
        &self,
        tree: &DialogueTree,
        state: &mut DialogueState,
        events: &dyn EventSource,
        messages: &dyn MessageSink,
    ) -> Result<RunOutcome, EngineError> {
        match tree.kind {
            TreeKind::Single => {
                let root = &tree.nodes[0];
                let ctx = TreeContext { kind: tree.kind, root_id: root.id.clone() };
                match visit(root, &ctx, state, events, messages).await? {
                    NodeStatus::Exited(action) => {
                        info!(%action, "dialogue exited early");
                        Ok(RunOutcome::Exited { action })
                    }
                    NodeStatus::Done => {
                        let value = compose_node(root, state);
                        state.remember(&root.id, value.clone(), true);
                        Ok(RunOutcome::Completed { value })
                    }
                }
            }
            // A collection tree retrieves each element independently, in
            // order, and composes an array. One element's exit aborts the
            // remaining elements.
            TreeKind::Collection => {
                let mut elements = Vec::with_capacity(tree.nodes.len());
                for node in &tree.nodes {
                    let ctx = TreeContext { kind: tree.kind, root_id: node.id.clone() };
                    match visit(node, &ctx, state, events, messages).await? {
                        NodeStatus::Exited(action) => {
                            info!(%action, "dialogue exited early");
                            return Ok(RunOutcome::Exited { action });
                        }
                        NodeStatus::Done => {
                            let value = compose_node(node, state);
                            state.remember(&node.id, value.clone(), true);
                            elements.push(value);
                        }
                    }
                }
                Ok(RunOutcome::Completed { value: Value::Array(elements) })
            }
        }
    }
}

/// Retrieve one node and, recursively, its required unfilled children.
///
/// The node's own retrieval runs first: a structural full-parse there can
/// fill the children in a single turn, in which case they are skipped. A
/// composite node with no scripts of its own goes straight to its children.
async fn visit(
    node: &DialogueNode,
    ctx: &TreeContext,
    state: &mut DialogueState,
    events: &dyn EventSource,
    messages: &dyn MessageSink,
) -> Result<NodeStatus, EngineError> {
    if !state.is_filled(&node.id) && !(node.is_composite() && node.opening_step().is_none()) {
        match retrieve(node, ctx, state, events, messages).await {
            Ok(RetrieveOutcome::Success { .. }) => {}
            Ok(RetrieveOutcome::Exited { action }) => return Ok(NodeStatus::Exited(action)),
            Err(err) => return Err(err),
        }
    }

    for child in &node.children {
        if !child.required || state.is_filled(&child.id) {
            continue;
        }
        match Box::pin(visit(child, ctx, state, events, messages)).await {
            Ok(NodeStatus::Done) => {}
            Ok(NodeStatus::Exited(action)) => return Ok(NodeStatus::Exited(action)),
            // A child the dialogue cannot retrieve is skipped, not fatal;
            // composition will leave its field out. Protocol violations
            // still abort.
            Err(err @ EngineError::UnknownEvent { .. }) => return Err(err),
            Err(err) => {
                warn!(child_id = %child.id, error = %err, "skipping unretrievable child node");
            }
        }
    }

    // Children are authoritative for a composite: recompose even when a
    // structural match already stored a value, so late child answers are
    // never shadowed by a stale partial object.
    if node.is_composite() {
        let value = compose_node(node, state);
        state.remember(&node.id, value, true);
    }
    Ok(NodeStatus::Done)
}
