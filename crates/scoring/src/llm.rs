//! LLM-backed slot scoring.
//!
//! The model is strictly a candidate producer: it proposes `{value,
//! confidence}` pairs for one slot kind and one utterance, and everything it
//! proposes is re-validated deterministically before fusion.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use colloquy_core::config::{LlmConfig, LlmProvider};
use colloquy_core::pipeline::{Candidate, Scorer};
use colloquy_core::ScoreError;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::{debug, warn};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Chat-completion client for the configured provider.
pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: LlmProvider,
    api_key: Option<String>,
    base_url: Option<String>,
    model: String,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("could not build llm http client")?;

        Ok(Self {
            client,
            provider: config.provider,
            api_key: config.api_key.as_ref().map(|key| key.expose_secret().to_owned()),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn complete_once(&self, prompt: &str) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAi => {
                let base = self.base_url.as_deref().unwrap_or("https://api.openai.com");
                let key = self.api_key.as_deref().ok_or_else(|| anyhow!("missing api key"))?;
                let body = json!({
                    "model": self.model,
                    "messages": [{"role": "user", "content": prompt}],
                    "temperature": 0,
                });
                let response: Value = self
                    .client
                    .post(format!("{base}/v1/chat/completions"))
                    .bearer_auth(key)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                response["choices"][0]["message"]["content"]
                    .as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| anyhow!("openai response had no message content"))
            }
            LlmProvider::Anthropic => {
                let base = self.base_url.as_deref().unwrap_or("https://api.anthropic.com");
                let key = self.api_key.as_deref().ok_or_else(|| anyhow!("missing api key"))?;
                let body = json!({
                    "model": self.model,
                    "max_tokens": 1024,
                    "messages": [{"role": "user", "content": prompt}],
                });
                let response: Value = self
                    .client
                    .post(format!("{base}/v1/messages"))
                    .header("x-api-key", key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                response["content"][0]["text"]
                    .as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| anyhow!("anthropic response had no text content"))
            }
            LlmProvider::Ollama => {
                let base =
                    self.base_url.as_deref().ok_or_else(|| anyhow!("missing ollama base url"))?;
                let body = json!({
                    "model": self.model,
                    "prompt": prompt,
                    "stream": false,
                });
                let response: Value = self
                    .client
                    .post(format!("{base}/api/generate"))
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                response["response"]
                    .as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| anyhow!("ollama response had no response field"))
            }
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.complete_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(error) => {
                    warn!(attempt, %error, "llm completion attempt failed");
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("llm completion failed")))
    }
}

/// Adapts any [`LlmClient`] to the pipeline's [`Scorer`] seam.
pub struct LlmSlotScorer {
    client: Arc<dyn LlmClient>,
}

impl LlmSlotScorer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Scorer for LlmSlotScorer {
    async fn score(&self, kind: &str, text: &str) -> Result<Vec<Candidate>, ScoreError> {
        let prompt = build_prompt(kind, text);
        let completion =
            self.client.complete(&prompt).await.map_err(|error| ScoreError(error.to_string()))?;
        let candidates = parse_candidates(&completion)
            .map_err(|error| ScoreError(format!("unparseable llm candidates: {error}")))?;
        debug!(kind, count = candidates.len(), "llm produced candidates");
        Ok(candidates)
    }
}

fn build_prompt(kind: &str, text: &str) -> String {
    format!(
        "Extract every plausible `{kind}` value from the user utterance below.\n\
         Respond with a JSON array only, no prose. Each element must be an object\n\
         {{\"value\": <extracted value>, \"confidence\": <0.0-1.0>}}.\n\
         For dates, `value` must be {{\"day\": n, \"month\": n, \"year\": n}}.\n\
         For person names, `value` must be {{\"first\": s, \"last\": s}}.\n\
         Respond with [] when the utterance contains no such value.\n\n\
         Utterance: {text}"
    )
}

/// Parse the candidate array out of a completion, tolerating prose around
/// the JSON. Confidence is clamped to `[0, 1]`.
fn parse_candidates(completion: &str) -> Result<Vec<Candidate>> {
    let start = completion.find('[').ok_or_else(|| anyhow!("no JSON array in completion"))?;
    let end = completion.rfind(']').ok_or_else(|| anyhow!("no JSON array in completion"))?;
    if end < start {
        return Err(anyhow!("malformed JSON array in completion"));
    }

    let mut candidates: Vec<Candidate> = serde_json::from_str(&completion[start..=end])
        .context("candidate array did not deserialize")?;
    for candidate in &mut candidates {
        candidate.confidence = candidate.confidence.clamp(0.0, 1.0);
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedClient {
        completion: &'static str,
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.completion.to_owned())
        }
    }

    #[tokio::test]
    async fn candidates_are_parsed_out_of_surrounding_prose() {
        let scorer = LlmSlotScorer::new(Arc::new(CannedClient {
            completion: r#"Sure! Here is the extraction:
[{"value": {"day": 16, "month": 12, "year": 1961}, "confidence": 0.9}]
Let me know if you need anything else."#,
        }));

        let candidates = scorer.score("date", "sono nato il 16 dicembre 1961").await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].confidence, 0.9);
        assert_eq!(candidates[0].value["month"], 12);
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_clamped() {
        let scorer = LlmSlotScorer::new(Arc::new(CannedClient {
            completion: r#"[{"value": "a@b.it", "confidence": 1.7}]"#,
        }));

        let candidates = scorer.score("email", "a@b.it").await.unwrap();
        assert_eq!(candidates[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn completions_without_json_are_a_score_error() {
        let scorer =
            LlmSlotScorer::new(Arc::new(CannedClient { completion: "I could not find any value." }));

        let error = scorer.score("email", "boh").await.unwrap_err();
        assert!(error.to_string().contains("unparseable"));
    }

    #[tokio::test]
    async fn empty_array_means_no_candidates() {
        let scorer = LlmSlotScorer::new(Arc::new(CannedClient { completion: "[]" }));
        let candidates = scorer.score("phone", "nessun numero").await.unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn prompt_names_the_kind_and_carries_the_utterance() {
        let prompt = build_prompt("iban", "il mio iban è IT60...");
        assert!(prompt.contains("`iban`"));
        assert!(prompt.contains("il mio iban è IT60..."));
    }
}
