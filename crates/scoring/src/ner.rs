//! Entity-recognition scoring.
//!
//! Sends the utterance to an external NER service, keeps the entity spans
//! whose label corresponds to the requested slot kind, and re-parses each
//! span with the deterministic extractor for that kind. The service decides
//! WHERE the value is; the deterministic grammar still decides WHAT it is.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use colloquy_core::extract::ExtractorRegistry;
use colloquy_core::pipeline::{Candidate, Scorer};
use colloquy_core::ScoreError;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct EntityResponse {
    entities: Vec<Entity>,
}

#[derive(Debug, Deserialize)]
struct Entity {
    label: String,
    text: String,
    score: f64,
}

/// Scorer backed by an HTTP NER service exposing `POST /entities`.
pub struct HttpEntityScorer {
    client: reqwest::Client,
    base_url: String,
    registry: Arc<ExtractorRegistry>,
}

impl HttpEntityScorer {
    pub fn new(base_url: String, timeout_secs: u64, registry: Arc<ExtractorRegistry>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("could not build ner http client")?;
        Ok(Self { client, base_url, registry })
    }

    async fn recognize(&self, text: &str) -> Result<EntityResponse> {
        let response = self
            .client
            .post(format!("{}/entities", self.base_url.trim_end_matches('/')))
            .json(&json!({ "text": text }))
            .send()
            .await?
            .error_for_status()?
            .json::<EntityResponse>()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl Scorer for HttpEntityScorer {
    async fn score(&self, kind: &str, text: &str) -> Result<Vec<Candidate>, ScoreError> {
        let Some(labels) = labels_for(kind) else {
            return Ok(Vec::new());
        };
        let response =
            self.recognize(text).await.map_err(|error| ScoreError(error.to_string()))?;
        let candidates = candidates_from(&response.entities, labels, kind, &self.registry);
        debug!(kind, count = candidates.len(), "ner produced candidates");
        Ok(candidates)
    }
}

/// Entity labels that can carry a value of this kind. Kinds arrive already
/// resolved and normalized by the registry. `None` means the kind has no
/// NER counterpart and the scorer stays silent.
fn labels_for(kind: &str) -> Option<&'static [&'static str]> {
    match kind {
        "date" => Some(&["DATE"]),
        "personname" => Some(&["PER", "PERSON"]),
        "email" => Some(&["EMAIL"]),
        "phone" => Some(&["PHONE", "TEL"]),
        "number" => Some(&["CARDINAL", "NUMBER"]),
        "iban" | "vat" | "taxcode" => Some(&["MISC", "ID"]),
        _ => None,
    }
}

fn candidates_from(
    entities: &[Entity],
    labels: &[&str],
    kind: &str,
    registry: &ExtractorRegistry,
) -> Vec<Candidate> {
    let extractor = registry.get(kind);
    entities
        .iter()
        .filter(|entity| labels.contains(&entity.label.as_str()))
        .map(|entity| {
            // Re-parse the labelled span deterministically; keep the span
            // verbatim when the grammar has nothing better.
            let value = extractor
                .and_then(|extractor| extractor.extract(&entity.text, None).value)
                .unwrap_or_else(|| Value::String(entity.text.clone()));
            Candidate { value, confidence: entity.score.clamp(0.0, 1.0) }
        })
        .collect()
}
