//! Wire protocol for delegating a dialogue to a session server.
//!
//! The server owns the tree walk, the extraction pipeline, and dialogue
//! memory; the client only relays raw utterances and renders the messages
//! that come back.

use async_trait::async_trait;
use colloquy_core::{DialogueTree, StepType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http transport failure: {0}")]
    Http(#[from] reqwest::Error),
    #[error("session server rejected the request with status {status}")]
    Status { status: u16 },
    #[error("session server sent a malformed payload: {0}")]
    Protocol(String),
}

/// One prompt emitted by the server, mirroring the local sink's shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub text: String,
    pub step: StepType,
    pub level: u32,
}

/// What the server is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WireExpecting {
    Value,
    Confirmation,
}

/// Server-side progress after one exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TurnState {
    #[serde(rename_all = "camelCase")]
    AwaitingInput { node_id: String, expecting: WireExpecting },
    Completed { value: Value },
    Exited { action: String },
    Failed { message: String },
}

/// Messages plus progress for one exchange with the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub messages: Vec<ServerMessage>,
    #[serde(flatten)]
    pub state: TurnState,
}

/// Raw client input for one turn. `None` text means silence (a timeout on
/// the client side), which the server turns into a `noInput` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientInput {
    pub text: Option<String>,
}

/// Session lifecycle against a dialogue server.
#[async_trait]
pub trait SessionProtocol: Send + Sync {
    /// Create a session for this tree and return the opening turn.
    async fn start_session(&self, tree: &DialogueTree) -> Result<(SessionId, Turn), TransportError>;

    /// Relay one raw input and receive the next turn.
    async fn advance(&self, session: SessionId, input: ClientInput)
        -> Result<Turn, TransportError>;

    /// Tear the session down. Idempotent on the server side.
    async fn delete_session(&self, session: SessionId) -> Result<(), TransportError>;
}

/// HTTP client for the session server.
pub struct HttpSessionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSessionClient {
    pub fn new(base_url: String, timeout_secs: u64, api_key: Option<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_owned(), api_key })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status { status: status.as_u16() });
        }
        response.json::<T>().await.map_err(|error| TransportError::Protocol(error.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    session_id: SessionId,
    #[serde(flatten)]
    turn: Turn,
}

#[async_trait]
impl SessionProtocol for HttpSessionClient {
    async fn start_session(&self, tree: &DialogueTree) -> Result<(SessionId, Turn), TransportError> {
        let response = self
            .request(self.client.post(format!("{}/sessions", self.base_url)))
            .json(tree)
            .send()
            .await?;
        let started: StartResponse = Self::decode(response).await?;
        Ok((started.session_id, started.turn))
    }

    async fn advance(
        &self,
        session: SessionId,
        input: ClientInput,
    ) -> Result<Turn, TransportError> {
        let response = self
            .request(self.client.post(format!("{}/sessions/{session}/input", self.base_url)))
            .json(&input)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn delete_session(&self, session: SessionId) -> Result<(), TransportError> {
        let response = self
            .request(self.client.delete(format!("{}/sessions/{session}", self.base_url)))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() || status.as_u16() == 404 {
            Ok(())
        } else {
            Err(TransportError::Status { status: status.as_u16() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn turns_round_trip_with_a_flattened_state_tag() {
        let turn = Turn {
            messages: vec![ServerMessage {
                text: "Quando sei nato?".to_owned(),
                step: StepType::Start,
                level: 1,
            }],
            state: TurnState::AwaitingInput {
                node_id: "dob".to_owned(),
                expecting: WireExpecting::Value,
            },
        };

        let wire = serde_json::to_value(&turn).expect("serialize");
        assert_eq!(wire["state"], "awaitingInput");
        assert_eq!(wire["nodeId"], "dob");
        assert_eq!(wire["messages"][0]["step"], "start");

        let back: Turn = serde_json::from_value(wire).expect("deserialize");
        assert_eq!(back, turn);
    }

    #[test]
    fn completed_turns_carry_the_composed_value() {
        let wire = json!({
            "messages": [],
            "state": "completed",
            "value": {"dob.day": 16, "dob.month": 12, "dob.year": 1961}
        });
        let turn: Turn = serde_json::from_value(wire).expect("deserialize");
        assert!(matches!(turn.state, TurnState::Completed { ref value } if value["dob.day"] == 16));
    }

    #[test]
    fn silence_serializes_as_null_text() {
        let wire = serde_json::to_value(ClientInput { text: None }).expect("serialize");
        assert_eq!(wire, json!({"text": null}));
    }
}
