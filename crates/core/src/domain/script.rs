use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Named phase of the dialogue on a single node.
///
/// `Normal` is a legacy alias for `Start`: when both appear, the first one
/// found wins and only one opening prompt is ever executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepType {
    Start,
    Normal,
    NoMatch,
    NoInput,
    Confirmation,
    Success,
    NotConfirmed,
}

impl StepType {
    pub fn key(&self) -> &'static str {
        match self {
            StepType::Start => "start",
            StepType::Normal => "normal",
            StepType::NoMatch => "noMatch",
            StepType::NoInput => "noInput",
            StepType::Confirmation => "confirmation",
            StepType::Success => "success",
            StepType::NotConfirmed => "notConfirmed",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "start" => Some(StepType::Start),
            "normal" | "Normal" => Some(StepType::Normal),
            "noMatch" => Some(StepType::NoMatch),
            "noInput" => Some(StepType::NoInput),
            "confirmation" => Some(StepType::Confirmation),
            "success" => Some(StepType::Success),
            "notConfirmed" => Some(StepType::NotConfirmed),
            _ => None,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One prompt-emitting (or dialogue-terminating) action inside an escalation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Task {
    Message { text: String },
    Exit { action: String },
}

/// Ordered tasks to execute at one attempt level of a step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Escalation {
    /// Exit action carried by this escalation, consulted before any message
    /// is emitted.
    pub fn exit_action(&self) -> Option<&str> {
        self.tasks.iter().find_map(|task| match task {
            Task::Exit { action } => Some(action.as_str()),
            Task::Message { .. } => None,
        })
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().filter_map(|task| match task {
            Task::Message { text } => Some(text.as_str()),
            Task::Exit { .. } => None,
        })
    }
}

/// A step script: the escalation ladder for one dialogue phase of a node.
///
/// Escalation lists are 1-indexed conceptually; attempt level `n` resolves
/// to `escalations[min(n - 1, len - 1)]`, so running past the authored
/// levels repeats the last one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepScript {
    pub step: StepType,
    #[serde(default)]
    pub escalations: Vec<Escalation>,
}

/// Accepts both authoring shapes for a node's steps and normalizes them to
/// the ordered-list form at the loading boundary, so the engine never
/// branches on shape.
///
/// Legacy trees store steps either as an ordered array of
/// `{step, escalations}` objects or as an object keyed by step type. Both
/// deserialize here; unknown keys in the keyed form are dropped with a
/// warning rather than failing the whole tree.
pub(crate) fn deserialize_steps<'de, D>(deserializer: D) -> Result<Vec<StepScript>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StepsRepr {
        List(Vec<StepScript>),
        Keyed(BTreeMap<String, Vec<Escalation>>),
    }

    match StepsRepr::deserialize(deserializer)? {
        StepsRepr::List(scripts) => Ok(scripts),
        StepsRepr::Keyed(map) => {
            let mut scripts = Vec::with_capacity(map.len());
            for (key, escalations) in map {
                match StepType::from_key(&key) {
                    Some(step) => scripts.push(StepScript { step, escalations }),
                    None => {
                        tracing::warn!(step_key = %key, "dropping unknown step key in keyed steps form");
                    }
                }
            }
            Ok(scripts)
        }
    }
}
