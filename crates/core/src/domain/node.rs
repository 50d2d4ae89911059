use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::script::{deserialize_steps, StepScript, StepType, Task};
use crate::errors::TreeError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full-value pattern for a composite node, applied to the raw utterance
/// before any per-field extraction.
///
/// `schema` maps a capture role to the id of the child slot it fills. Tree
/// authors may declare it explicitly; when absent it is derived once at load
/// time from child-label heuristics, so the runtime only ever does lookups.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StructuralPattern {
    pub pattern: String,
    #[serde(default)]
    pub schema: BTreeMap<String, NodeId>,
    #[serde(skip)]
    pub(crate) compiled: Option<Regex>,
}

impl StructuralPattern {
    pub fn regex(&self) -> Option<&Regex> {
        self.compiled.as_ref()
    }
}

/// A single data requirement in the tree.
///
/// A node with children is composite: it is never matched directly against
/// raw extraction unless it carries a structural pattern; its value is
/// composed from its children instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueNode {
    pub id: NodeId,
    #[serde(default)]
    pub label: Option<String>,
    pub kind: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub children: Vec<DialogueNode>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub constraints: BTreeMap<String, serde_json::Value>,
    #[serde(default, deserialize_with = "deserialize_steps")]
    pub steps: Vec<StepScript>,
    #[serde(default)]
    pub structural: Option<StructuralPattern>,
}

fn default_true() -> bool {
    true
}

impl DialogueNode {
    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn step(&self, step: StepType) -> Option<&StepScript> {
        self.steps.iter().find(|script| script.step == step)
    }

    /// The opening script: the first of `start`/`normal` found in authored
    /// order. Only one of them is ever executed.
    pub fn opening_step(&self) -> Option<&StepScript> {
        self.steps
            .iter()
            .find(|script| matches!(script.step, StepType::Start | StepType::Normal))
    }

    pub fn child(&self, id: &NodeId) -> Option<&DialogueNode> {
        self.children.iter().find(|child| &child.id == id)
    }
}

/// Collection trees repeat a sub-tree template over independent elements;
/// single trees carry exactly one main node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TreeKind {
    #[default]
    Single,
    Collection,
}

/// A loaded, normalized dialogue tree instance.
///
/// Loading is the only shape-tolerant boundary: steps are normalized to the
/// list form, translation keys in task texts are substituted, structural
/// patterns are compiled, and missing capture schemas are derived. The
/// engine downstream sees exactly one representation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueTree {
    #[serde(default)]
    pub kind: TreeKind,
    pub nodes: Vec<DialogueNode>,
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
}

/// Read-only context handed to the input-collection collaborator alongside
/// the node being retrieved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeContext {
    pub kind: TreeKind,
    pub root_id: NodeId,
}

impl DialogueTree {
    pub fn from_json(raw: &str) -> Result<Self, TreeError> {
        let mut tree: DialogueTree = serde_json::from_str(raw)?;
        tree.normalize()?;
        Ok(tree)
    }

    pub fn from_value(raw: serde_json::Value) -> Result<Self, TreeError> {
        let mut tree: DialogueTree = serde_json::from_value(raw)?;
        tree.normalize()?;
        Ok(tree)
    }

    fn normalize(&mut self) -> Result<(), TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::Empty);
        }
        let translations = self.translations.clone();
        for node in &mut self.nodes {
            normalize_node(node, &translations)?;
        }
        Ok(())
    }

    pub fn context(&self) -> TreeContext {
        TreeContext { kind: self.kind, root_id: self.nodes[0].id.clone() }
    }
}

fn normalize_node(
    node: &mut DialogueNode,
    translations: &BTreeMap<String, String>,
) -> Result<(), TreeError> {
    for script in &mut node.steps {
        for escalation in &mut script.escalations {
            for task in &mut escalation.tasks {
                if let Task::Message { text } = task {
                    if let Some(resolved) = translations.get(text.as_str()) {
                        *text = resolved.clone();
                    }
                }
            }
        }
    }

    if let Some(structural) = &mut node.structural {
        let compiled = Regex::new(&structural.pattern).map_err(|err| {
            TreeError::InvalidStructuralPattern {
                node_id: node.id.clone(),
                message: err.to_string(),
            }
        })?;
        structural.compiled = Some(compiled);
        if structural.schema.is_empty() {
            structural.schema = derive_capture_schema(&node.children);
        }
    }

    for child in &mut node.children {
        normalize_node(child, translations)?;
    }
    Ok(())
}

/// Label-token heuristics, applied once at load time when the author did not
/// declare a capture schema. Maps a capture role to the child that fills it.
fn derive_capture_schema(children: &[DialogueNode]) -> BTreeMap<String, NodeId> {
    let mut schema = BTreeMap::new();
    for child in children {
        let haystack = child
            .label
            .as_deref()
            .unwrap_or(child.id.as_str())
            .to_lowercase();
        let role = if haystack.contains("day") || haystack.contains("giorno") {
            Some("day")
        } else if haystack.contains("month") || haystack.contains("mese") {
            Some("month")
        } else if haystack.contains("year") || haystack.contains("anno") {
            Some("year")
        } else if haystack.contains("last")
            || haystack.contains("cognome")
            || haystack.contains("surname")
        {
            // "cognome" contains "nome", so the last-name tokens must be
            // checked before the first-name ones.
            Some("last")
        } else if haystack.contains("first") || haystack.contains("nome") {
            Some("first")
        } else {
            None
        };
        if let Some(role) = role {
            schema.entry(role.to_owned()).or_insert_with(|| child.id.clone());
        }
    }
    schema
}
