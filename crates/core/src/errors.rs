use thiserror::Error;

use crate::domain::node::NodeId;
use crate::domain::script::StepType;

/// Failures raised while running a single node or a whole dialogue.
///
/// Extraction never surfaces here: low-confidence or unparseable input is a
/// `SlotDecision`, not an error, and re-enters the dialogue as a `noMatch`
/// turn. This taxonomy covers authoring gaps, protocol violations, and
/// transport loss.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("node `{node_id}` defines no start or normal script")]
    MissingStartScript { node_id: NodeId },
    #[error("node `{node_id}` has no `{step}` recovery script at attempt {attempt}")]
    MissingRecoveryScript { node_id: NodeId, step: StepType, attempt: u32 },
    #[error("node `{node_id}` received an event it cannot handle in its current state")]
    UnknownEvent { node_id: NodeId },
    #[error("event source failed for node `{node_id}`: {message}")]
    EventSource { node_id: NodeId, message: String },
    #[error("remote transport failure: {0}")]
    Transport(String),
}

/// Failure of an external scoring service (NER or LLM). The pipeline logs
/// these and carries on; they never abort an extraction.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("scoring service failure: {0}")]
pub struct ScoreError(pub String);

/// Failures while loading or validating a dialogue tree definition.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("could not parse dialogue tree: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("node `{node_id}` declares an invalid structural pattern: {message}")]
    InvalidStructuralPattern { node_id: NodeId, message: String },
    #[error("dialogue tree has no nodes")]
    Empty,
}
