//! The per-node retrieval state machine.
//!
//! One invocation runs a single node to completion: prompt, await an event,
//! branch on noMatch/noInput/match/confirmation/exit, advance the attempt
//! counters, and write the accepted value to memory. Extraction never
//! happens here — the input-collection collaborator owns raw text and hands
//! the machine ready-made events.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domain::node::{DialogueNode, TreeContext};
use crate::domain::script::{Escalation, StepType};
use crate::errors::EngineError;
use crate::escalation::{resolve_escalation, resolve_step};
use crate::extract::{structural, ExtractorRegistry};
use crate::memory::DialogueState;

/// Tagged per-turn event produced by the input-collection collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum RetrieveEvent {
    NoMatch,
    NoInput,
    Match(Value),
    Confirmed,
    NotConfirmed,
    Exit(String),
}

/// What the machine is waiting for when it asks for the next event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expecting {
    Value,
    Confirmation,
}

/// Pre-classification of raw input, for collaborators that want to resolve
/// text themselves before it becomes an event. A partial match counts as a
/// match.
#[derive(Clone, Debug, PartialEq)]
pub enum InputClassification {
    Match(Value),
    PartialMatch(Value),
    NoMatch,
    NoInput,
}

impl InputClassification {
    pub fn into_event(self) -> RetrieveEvent {
        match self {
            InputClassification::Match(value) | InputClassification::PartialMatch(value) => {
                RetrieveEvent::Match(value)
            }
            InputClassification::NoMatch => RetrieveEvent::NoMatch,
            InputClassification::NoInput => RetrieveEvent::NoInput,
        }
    }
}

/// Input-collection collaborator. `next_event` is the engine's only
/// suspension point; it resolves when the end user has produced an
/// utterance, a timeout raised `noInput`, or the caller wants out.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn next_event(
        &self,
        node: &DialogueNode,
        ctx: &TreeContext,
        expecting: Expecting,
    ) -> Result<RetrieveEvent, EngineError>;

    /// Optional hook for implementations that pre-classify raw text before
    /// translating it into an event.
    fn process_input(&self, _raw: &str, _node: &DialogueNode) -> Option<InputClassification> {
        None
    }

    /// Raw utterance for the same turn, when the implementation has one.
    /// The remote-delegated engine relays this to the server verbatim.
    async fn collect_raw(
        &self,
        _node: &DialogueNode,
        _ctx: &TreeContext,
    ) -> Result<Option<String>, EngineError> {
        Ok(None)
    }
}

/// Message-emission collaborator: receives already-resolved prompt text,
/// never raw translation keys.
pub trait MessageSink: Send + Sync {
    fn emit(&self, text: &str, step: StepType, level: u32);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmittedMessage {
    pub text: String,
    pub step: StepType,
    pub level: u32,
}

/// Recording sink for tests, linting, and preview flows.
#[derive(Clone, Default)]
pub struct InMemoryMessageSink {
    messages: Arc<Mutex<Vec<EmittedMessage>>>,
}

impl InMemoryMessageSink {
    pub fn messages(&self) -> Vec<EmittedMessage> {
        self.messages.lock().expect("sink poisoned").clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }
}

impl MessageSink for InMemoryMessageSink {
    fn emit(&self, text: &str, step: StepType, level: u32) {
        self.messages.lock().expect("sink poisoned").push(EmittedMessage {
            text: text.to_owned(),
            step,
            level,
        });
    }
}

/// Queue-backed event source for tests and scripted demos.
#[derive(Default)]
pub struct ScriptedEventSource {
    events: Mutex<std::collections::VecDeque<RetrieveEvent>>,
}

impl ScriptedEventSource {
    pub fn new(events: impl IntoIterator<Item = RetrieveEvent>) -> Self {
        Self { events: Mutex::new(events.into_iter().collect()) }
    }
}

#[async_trait]
impl EventSource for ScriptedEventSource {
    async fn next_event(
        &self,
        node: &DialogueNode,
        _ctx: &TreeContext,
        _expecting: Expecting,
    ) -> Result<RetrieveEvent, EngineError> {
        self.events.lock().expect("script poisoned").pop_front().ok_or_else(|| {
            EngineError::EventSource {
                node_id: node.id.clone(),
                message: "scripted events exhausted".to_owned(),
            }
        })
    }
}

/// How a single node run ended.
#[derive(Clone, Debug, PartialEq)]
pub enum RetrieveOutcome {
    Success { value: Value },
    Exited { action: String },
}

enum Phase {
    Opening,
    Awaiting,
    Confirming { value: Value },
}

/// Run one node to completion: value accepted (and confirmed when the node
/// asks for it), exit, or an unrecoverable failure.
pub async fn retrieve(
    node: &DialogueNode,
    ctx: &TreeContext,
    state: &mut DialogueState,
    events: &dyn EventSource,
    messages: &dyn MessageSink,
) -> Result<RetrieveOutcome, EngineError> {
    let mut phase = Phase::Opening;

    loop {
        phase = match phase {
            Phase::Opening => {
                let script = node
                    .opening_step()
                    .ok_or_else(|| EngineError::MissingStartScript { node_id: node.id.clone() })?;
                let opening = resolve_escalation(script, 1)
                    .ok_or_else(|| EngineError::MissingStartScript { node_id: node.id.clone() })?;
                if let Some(action) = play(opening, script.step, 1, None, messages) {
                    return Ok(RetrieveOutcome::Exited { action });
                }
                Phase::Awaiting
            }

            Phase::Awaiting => match events.next_event(node, ctx, Expecting::Value).await? {
                RetrieveEvent::NoMatch => {
                    state.counters_mut(&node.id).no_match += 1;
                    let attempt = state.counters(&node.id).no_match;
                    match resolve_step(node, StepType::NoMatch, attempt) {
                        Some(recovery) => {
                            if let Some(action) =
                                play(recovery, StepType::NoMatch, attempt, None, messages)
                            {
                                return Ok(RetrieveOutcome::Exited { action });
                            }
                        }
                        // Authoring gap tolerated for noMatch only: repeat
                        // the opening prompt instead of failing the node.
                        None => {
                            debug!(node_id = %node.id, attempt, "no noMatch script; re-running opening prompt");
                            let script = node.opening_step().ok_or_else(|| {
                                EngineError::MissingStartScript { node_id: node.id.clone() }
                            })?;
                            if let Some(opening) = resolve_escalation(script, 1) {
                                if let Some(action) =
                                    play(opening, script.step, 1, None, messages)
                                {
                                    return Ok(RetrieveOutcome::Exited { action });
                                }
                            }
                        }
                    }
                    Phase::Awaiting
                }

                RetrieveEvent::NoInput => {
                    state.counters_mut(&node.id).no_input += 1;
                    let attempt = state.counters(&node.id).no_input;
                    let recovery = resolve_step(node, StepType::NoInput, attempt).ok_or_else(
                        || EngineError::MissingRecoveryScript {
                            node_id: node.id.clone(),
                            step: StepType::NoInput,
                            attempt,
                        },
                    )?;
                    if let Some(action) =
                        play(recovery, StepType::NoInput, attempt, None, messages)
                    {
                        return Ok(RetrieveOutcome::Exited { action });
                    }
                    Phase::Awaiting
                }

                RetrieveEvent::Match(value) => {
                    if node.step(StepType::Confirmation).is_some() {
                        let level = state.counters(&node.id).not_confirmed + 1;
                        let prompt =
                            resolve_step(node, StepType::Confirmation, level).ok_or_else(|| {
                                EngineError::MissingRecoveryScript {
                                    node_id: node.id.clone(),
                                    step: StepType::Confirmation,
                                    attempt: level,
                                }
                            })?;
                        let shown = value_display(node, &value);
                        if let Some(action) =
                            play(prompt, StepType::Confirmation, level, Some(&shown), messages)
                        {
                            return Ok(RetrieveOutcome::Exited { action });
                        }
                        Phase::Confirming { value }
                    } else {
                        return accept(node, state, value, messages);
                    }
                }

                RetrieveEvent::Exit(action) => return Ok(RetrieveOutcome::Exited { action }),

                RetrieveEvent::Confirmed | RetrieveEvent::NotConfirmed => {
                    return Err(EngineError::UnknownEvent { node_id: node.id.clone() })
                }
            },

            Phase::Confirming { value } => {
                match events.next_event(node, ctx, Expecting::Confirmation).await? {
                    RetrieveEvent::Confirmed => return accept(node, state, value, messages),

                    RetrieveEvent::NotConfirmed => {
                        state.counters_mut(&node.id).not_confirmed += 1;
                        let attempt = state.counters(&node.id).not_confirmed;
                        match resolve_step(node, StepType::NotConfirmed, attempt) {
                            Some(recovery) => {
                                if let Some(action) = play(
                                    recovery,
                                    StepType::NotConfirmed,
                                    attempt,
                                    None,
                                    messages,
                                ) {
                                    return Ok(RetrieveOutcome::Exited { action });
                                }
                                Phase::Awaiting
                            }
                            // No recovery script: restart the whole node
                            // from its opening prompt. The attempt counters
                            // are deliberately carried over, so escalation
                            // history survives the restart.
                            None => {
                                debug!(node_id = %node.id, "notConfirmed without recovery; restarting node");
                                Phase::Opening
                            }
                        }
                    }

                    RetrieveEvent::Exit(action) => {
                        return Ok(RetrieveOutcome::Exited { action })
                    }

                    // The confirmation turn accepts only confirmed,
                    // notConfirmed, or exit.
                    _ => return Err(EngineError::UnknownEvent { node_id: node.id.clone() }),
                }
            }
        };
    }
}

/// Execute one escalation: consult its exit action first, then emit every
/// message with the `{input}` placeholder substituted. Returns the exit
/// action when the escalation terminates the node.
fn play(
    escalation: &Escalation,
    step: StepType,
    level: u32,
    input: Option<&str>,
    messages: &dyn MessageSink,
) -> Option<String> {
    if let Some(action) = escalation.exit_action() {
        return Some(action.to_owned());
    }
    for text in escalation.messages() {
        let resolved = match input {
            Some(input) => text.replace("{input}", input),
            None => text.to_owned(),
        };
        messages.emit(&resolved, step, level);
    }
    None
}

/// Human rendering of an accepted value for `{input}` substitution. Routed
/// through the node's registered extractor; a composite value is remapped
/// from child-id keys back to the role keys its extractor formats.
fn value_display(node: &DialogueNode, value: &Value) -> String {
    if let Some(extractor) = ExtractorRegistry::shared().get(&node.kind) {
        if !node.is_composite() {
            return extractor.format(value);
        }
        if node.structural.is_some() {
            return extractor.format(&structural::role_view(node, value));
        }
    }
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn accept(
    node: &DialogueNode,
    state: &mut DialogueState,
    value: Value,
    messages: &dyn MessageSink,
) -> Result<RetrieveOutcome, EngineError> {
    // A composite value keyed by child ids fans out to the children's own
    // memory entries, so the navigator will not re-ask them.
    if node.is_composite() {
        if let Value::Object(fields) = &value {
            for child in &node.children {
                if let Some(field) = fields.get(child.id.as_str()) {
                    state.remember(&child.id, field.clone(), true);
                }
            }
        }
    }
    state.remember(&node.id, value.clone(), true);

    if let Some(script) = node.step(StepType::Success) {
        if let Some(escalation) = resolve_escalation(script, 1) {
            let shown = value_display(node, &value);
            if let Some(action) = play(escalation, StepType::Success, 1, Some(&shown), messages) {
                return Ok(RetrieveOutcome::Exited { action });
            }
        }
    }
    debug!(node_id = %node.id, "node retrieved and confirmed");
    Ok(RetrieveOutcome::Success { value })
}
