//! Terminal front end: stdin utterances in, prompts on stdout.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use colloquy_core::machine::{
    EventSource, Expecting, InputClassification, MessageSink, RetrieveEvent,
};
use colloquy_core::pipeline::{ExtractionPipeline, SlotDecision};
use colloquy_core::{DialogueNode, EngineError, NodeId, StepType, TreeContext};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

const AFFIRMATIVE: &[&str] = &["si", "sì", "yes", "y", "ok", "confermo", "esatto"];
const EXIT_WORDS: &[&str] = &["esci", "exit", "quit", "basta"];

/// Reads utterances line by line and resolves them through the extraction
/// pipeline. Partial fragments (a day without a year, a first name without
/// a last name) are kept per node and handed back on the next attempt.
pub struct StdinEventSource {
    pipeline: ExtractionPipeline,
    lines: tokio::sync::Mutex<Lines<BufReader<Stdin>>>,
    partials: Mutex<HashMap<NodeId, Value>>,
}

impl StdinEventSource {
    pub fn new(pipeline: ExtractionPipeline) -> Self {
        Self {
            pipeline,
            lines: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            partials: Mutex::new(HashMap::new()),
        }
    }

    async fn read_line(&self, node: &DialogueNode) -> Result<Option<String>, EngineError> {
        self.lines.lock().await.next_line().await.map_err(|error| EngineError::EventSource {
            node_id: node.id.clone(),
            message: error.to_string(),
        })
    }
}

#[async_trait]
impl EventSource for StdinEventSource {
    async fn next_event(
        &self,
        node: &DialogueNode,
        _ctx: &TreeContext,
        expecting: Expecting,
    ) -> Result<RetrieveEvent, EngineError> {
        // EOF means the user is gone; treat it as an explicit exit.
        let Some(line) = self.read_line(node).await? else {
            return Ok(RetrieveEvent::Exit("end-of-input".to_owned()));
        };
        let raw = line.trim();

        if expecting == Expecting::Confirmation {
            return Ok(if AFFIRMATIVE.contains(&raw.to_lowercase().as_str()) {
                RetrieveEvent::Confirmed
            } else {
                RetrieveEvent::NotConfirmed
            });
        }

        if EXIT_WORDS.contains(&raw.to_lowercase().as_str()) {
            return Ok(RetrieveEvent::Exit("user-quit".to_owned()));
        }
        if let Some(classification) = self.process_input(raw, node) {
            return Ok(classification.into_event());
        }

        let previous = self.partials.lock().expect("partials").get(&node.id).cloned();
        match self.pipeline.extract_field(node, raw, previous.as_ref()).await {
            SlotDecision::Accepted { value, source, confidence, .. } => {
                debug!(node_id = %node.id, ?source, confidence, "slot resolved");
                self.partials.lock().expect("partials").remove(&node.id);
                Ok(RetrieveEvent::Match(value))
            }
            SlotDecision::AskMore { partial, missing, .. } => {
                debug!(node_id = %node.id, ?missing, "partial fill, asking again");
                if let Some(partial) = partial {
                    self.partials.lock().expect("partials").insert(node.id.clone(), partial);
                }
                Ok(RetrieveEvent::NoMatch)
            }
            SlotDecision::Reject { reasons } => {
                debug!(node_id = %node.id, ?reasons, "utterance rejected");
                Ok(RetrieveEvent::NoMatch)
            }
        }
    }

    /// Silence is the only thing worth classifying before the pipeline.
    fn process_input(&self, raw: &str, _node: &DialogueNode) -> Option<InputClassification> {
        raw.trim().is_empty().then_some(InputClassification::NoInput)
    }

    /// Remote runs relay the line verbatim; an empty line is silence.
    async fn collect_raw(
        &self,
        node: &DialogueNode,
        _ctx: &TreeContext,
    ) -> Result<Option<String>, EngineError> {
        let line = self.read_line(node).await?.unwrap_or_default();
        let trimmed = line.trim();
        Ok(if trimmed.is_empty() { None } else { Some(trimmed.to_owned()) })
    }
}

/// Prints every prompt to stdout as-is.
pub struct StdoutMessageSink;

impl MessageSink for StdoutMessageSink {
    fn emit(&self, text: &str, step: StepType, level: u32) {
        debug!(%step, level, "prompt emitted");
        println!("{text}");
    }
}
