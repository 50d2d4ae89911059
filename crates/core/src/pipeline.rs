//! Per-slot extraction pipeline: structural full-parse, deterministic
//! extraction, and NER/LLM scoring fused by confidence.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::node::DialogueNode;
use crate::errors::ScoreError;
use crate::extract::{structural, ExtractorRegistry};

/// Minimum confidence for the deterministic extractor's own candidate.
pub const MIN_ACCEPT: f64 = 0.6;
/// Minimum confidence for a candidate coming from a scoring service.
pub const MIN_AFTER_NER: f64 = 0.7;
/// Confidence granted to a validated structural full-parse.
pub const STRUCTURAL_CONFIDENCE: f64 = 0.95;

/// Where an accepted candidate came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Source {
    Deterministic,
    Ner,
    Llm,
}

/// One scored candidate from an external scoring service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub value: Value,
    pub confidence: f64,
}

/// Black-box scoring service (NER or LLM). Implementations live outside the
/// core; failures are logged and treated as "no candidate from this source".
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, kind: &str, text: &str) -> Result<Vec<Candidate>, ScoreError>;
}

/// A per-source result that survived thresholding and validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub source: Source,
    pub value: Value,
    pub confidence: f64,
}

/// Outcome of one extraction attempt for one slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum SlotDecision {
    Accepted {
        value: Value,
        source: Source,
        confidence: f64,
        /// Every per-source partial result, kept for display and debugging.
        all_results: Vec<SourceResult>,
    },
    AskMore {
        /// Fragments gathered so far; the caller hands these back as
        /// `previous` on the next attempt.
        partial: Option<Value>,
        missing: Vec<String>,
        hint: Option<String>,
    },
    Reject {
        reasons: Vec<String>,
    },
}

pub struct ExtractionPipeline {
    registry: Arc<ExtractorRegistry>,
    ner: Option<Arc<dyn Scorer>>,
    llm: Option<Arc<dyn Scorer>>,
}

impl ExtractionPipeline {
    pub fn new(registry: Arc<ExtractorRegistry>) -> Self {
        Self { registry, ner: None, llm: None }
    }

    pub fn with_ner(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.ner = Some(scorer);
        self
    }

    pub fn with_llm(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.llm = Some(scorer);
        self
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// Resolve one slot from one utterance.
    ///
    /// A validated structural full-parse on a composite node wins outright
    /// and no other stage runs. Otherwise the deterministic extractor and
    /// both scoring services each contribute at most one validated
    /// candidate — the scorers always run, concurrently, and are awaited
    /// together rather than raced — and the strictly highest confidence
    /// wins, first maximum on ties.
    pub async fn extract_field(
        &self,
        node: &DialogueNode,
        text: &str,
        previous: Option<&Value>,
    ) -> SlotDecision {
        let kind = self.registry.resolve_kind(&node.kind);
        let Some(extractor) = self.registry.get(&kind) else {
            return SlotDecision::Reject { reasons: vec![format!("unknown kind `{}`", node.kind)] };
        };

        if node.is_composite() && node.structural.is_some() {
            if let Some(value) = structural::structural_parse(node, text) {
                let roles = structural::role_view(node, &value);
                if extractor.validate(&roles).ok {
                    debug!(node_id = %node.id, "structural full-parse accepted");
                    return SlotDecision::Accepted {
                        source: Source::Deterministic,
                        confidence: STRUCTURAL_CONFIDENCE,
                        all_results: vec![SourceResult {
                            source: Source::Deterministic,
                            value: value.clone(),
                            confidence: STRUCTURAL_CONFIDENCE,
                        }],
                        value,
                    };
                }
            }
        }

        let deterministic = extractor.extract(text, previous);
        let mut results: Vec<SourceResult> = Vec::new();
        if let Some(value) = &deterministic.value {
            if deterministic.confidence >= MIN_ACCEPT && extractor.validate(value).ok {
                results.push(SourceResult {
                    source: Source::Deterministic,
                    value: value.clone(),
                    confidence: deterministic.confidence,
                });
            }
        }

        // Both scoring passes run even when the deterministic stage already
        // produced a candidate: fusion compares the full set.
        let (ner, llm) = tokio::join!(
            score_source(self.ner.as_deref(), Source::Ner, &kind, text, &**extractor),
            score_source(self.llm.as_deref(), Source::Llm, &kind, text, &**extractor),
        );
        results.extend(ner);
        results.extend(llm);

        let mut best: Option<&SourceResult> = None;
        for result in &results {
            if best.map(|b| result.confidence > b.confidence).unwrap_or(true) {
                best = Some(result);
            }
        }
        if let Some(best) = best {
            // Per-kind extractors speak in role keys; composite consumers
            // (memory fan-out, composition) expect child-id keys.
            let value = if node.is_composite() {
                structural::id_view(node, &best.value)
            } else {
                best.value.clone()
            };
            return SlotDecision::Accepted {
                value,
                source: best.source,
                confidence: best.confidence,
                all_results: results.clone(),
            };
        }

        if !deterministic.missing.is_empty() {
            let hint = format!("still needed: {}", deterministic.missing.join(", "));
            return SlotDecision::AskMore {
                partial: deterministic.value,
                missing: deterministic.missing,
                hint: Some(hint),
            };
        }

        let reasons = if deterministic.reasons.is_empty() {
            vec!["low-confidence".to_owned()]
        } else {
            deterministic.reasons
        };
        SlotDecision::Reject { reasons }
    }
}

async fn score_source(
    scorer: Option<&dyn Scorer>,
    source: Source,
    kind: &str,
    text: &str,
    extractor: &dyn crate::extract::Extractor,
) -> Option<SourceResult> {
    let scorer = scorer?;
    match scorer.score(kind, text).await {
        Ok(candidates) => candidates
            .into_iter()
            .find(|candidate| {
                candidate.confidence >= MIN_AFTER_NER && extractor.validate(&candidate.value).ok
            })
            .map(|candidate| SourceResult {
                source,
                value: candidate.value,
                confidence: candidate.confidence,
            }),
        Err(error) => {
            // Scoring services are best-effort: a network or service error
            // must never abort the pipeline.
            warn!(?source, %error, "scoring service failed; treating as no candidate");
            None
        }
    }
}
