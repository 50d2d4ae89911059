//! Value composition: derive a node's effective value from its own memory
//! entry or from its children's entries.

use serde_json::{Map, Value};

use crate::domain::node::{DialogueNode, DialogueTree, TreeKind};
use crate::memory::DialogueState;

/// Compose the effective value of one node.
///
/// Atomic nodes return their own memory value verbatim (null when nothing
/// was retrieved). Composite nodes build an object keyed by each child's id
/// — never by its authored label — omitting children whose memory value is
/// still undefined. Pure over `state`: re-running on unchanged state yields
/// an identical value.
pub fn compose_node(node: &DialogueNode, state: &DialogueState) -> Value {
    if !node.is_composite() {
        return state.entry(&node.id).map(|entry| entry.value.clone()).unwrap_or(Value::Null);
    }

    let mut fields = Map::new();
    for child in &node.children {
        if let Some(entry) = state.entry(&child.id) {
            if !entry.value.is_null() {
                fields.insert(child.id.as_str().to_owned(), entry.value.clone());
            }
        }
    }
    Value::Object(fields)
}

/// Compose the final value of a whole tree.
///
/// Collection trees compose each element independently from memory by its
/// own id and return the ordered list; no values are merged across
/// elements. Single trees compose their one main node.
pub fn compose_tree(tree: &DialogueTree, state: &DialogueState) -> Value {
    match tree.kind {
        TreeKind::Collection => {
            Value::Array(tree.nodes.iter().map(|node| compose_node(node, state)).collect())
        }
        TreeKind::Single => compose_node(&tree.nodes[0], state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::NodeId;
    use serde_json::json;

    fn atomic(id: &str) -> DialogueNode {
        serde_json::from_value(json!({"id": id, "kind": "text"})).expect("node")
    }

    fn composite(id: &str, children: &[&str]) -> DialogueNode {
        serde_json::from_value(json!({
            "id": id,
            "kind": "date",
            "children": children.iter().map(|c| json!({"id": c, "kind": "number"})).collect::<Vec<_>>(),
        }))
        .expect("node")
    }

    #[test]
    fn atomic_node_returns_its_memory_value_verbatim() {
        let node = atomic("email");
        let mut state = DialogueState::new();
        state.remember(&NodeId::new("email"), json!("a@b.it"), true);

        assert_eq!(compose_node(&node, &state), json!("a@b.it"));
    }

    #[test]
    fn atomic_node_without_memory_composes_to_null() {
        assert_eq!(compose_node(&atomic("email"), &DialogueState::new()), Value::Null);
    }

    #[test]
    fn composite_node_keys_children_by_id_and_skips_undefined() {
        let node = composite("dob", &["dob.day", "dob.month", "dob.year"]);
        let mut state = DialogueState::new();
        state.remember(&NodeId::new("dob.day"), json!(16), true);
        state.remember(&NodeId::new("dob.month"), json!(12), true);
        state.remember(&NodeId::new("dob.year"), Value::Null, false);

        assert_eq!(compose_node(&node, &state), json!({"dob.day": 16, "dob.month": 12}));
    }

    #[test]
    fn composition_is_idempotent_on_unchanged_state() {
        let node = composite("dob", &["dob.day", "dob.month"]);
        let mut state = DialogueState::new();
        state.remember(&NodeId::new("dob.day"), json!(16), true);

        let first = compose_node(&node, &state);
        let second = compose_node(&node, &state);
        assert_eq!(first, second);
    }

    #[test]
    fn collection_tree_composes_each_element_independently() {
        let tree = DialogueTree {
            kind: TreeKind::Collection,
            nodes: vec![atomic("guest.1"), atomic("guest.2")],
            translations: Default::default(),
        };
        let mut state = DialogueState::new();
        state.remember(&NodeId::new("guest.1"), json!("Ada"), true);

        assert_eq!(compose_tree(&tree, &state), json!(["Ada", null]));
    }
}
