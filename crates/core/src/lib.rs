pub mod compose;
pub mod config;
pub mod domain;
pub mod errors;
pub mod escalation;
pub mod extract;
pub mod machine;
pub mod memory;
pub mod orchestrator;
pub mod pipeline;

pub use compose::{compose_node, compose_tree};
pub use config::{
    AppConfig, ConfigError, ConfigOverrides, EngineMode, LlmProvider, LoadOptions, LogFormat,
};
pub use domain::node::{
    DialogueNode, DialogueTree, NodeId, StructuralPattern, TreeContext, TreeKind,
};
pub use domain::script::{Escalation, StepScript, StepType, Task};
pub use errors::{EngineError, ScoreError, TreeError};
pub use escalation::{resolve_escalation, resolve_step};
pub use extract::{
    Extraction, Extractor, ExtractorRegistry, Validation, CHECKSUM_FAILED_CONFIDENCE,
};
pub use machine::{
    retrieve, EmittedMessage, EventSource, Expecting, InMemoryMessageSink, InputClassification,
    MessageSink, RetrieveEvent, RetrieveOutcome, ScriptedEventSource,
};
pub use memory::{AttemptCounters, DialogueState, MemoryEntry};
pub use orchestrator::{DialogueEngine, LocalEngine, RunOutcome};
pub use pipeline::{
    Candidate, ExtractionPipeline, Scorer, SlotDecision, Source, SourceResult, MIN_ACCEPT,
    MIN_AFTER_NER, STRUCTURAL_CONFIDENCE,
};
