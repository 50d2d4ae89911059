//! Remote-delegated dialogue engine.
//!
//! Runs the same `DialogueEngine` seam as the local navigator, but every
//! turn is decided by the session server: this side only relays raw
//! utterances upstream and renders the prompts that come back.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use colloquy_core::machine::{EventSource, MessageSink};
use colloquy_core::orchestrator::{DialogueEngine, RunOutcome};
use colloquy_core::{
    DialogueNode, DialogueState, DialogueTree, EngineError, NodeId, TreeContext,
};
use tracing::{debug, info, warn};

use crate::protocol::{ClientInput, SessionId, SessionProtocol, Turn, TurnState};

pub struct RemoteEngine<P> {
    protocol: P,
}

impl<P: SessionProtocol> RemoteEngine<P> {
    pub fn new(protocol: P) -> Self {
        Self { protocol }
    }

    /// Best-effort teardown, at most once per session. A lost delete is the
    /// server's expiry problem, not a run failure.
    async fn teardown(&self, session: SessionId, done: &AtomicBool) {
        if done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(error) = self.protocol.delete_session(session).await {
            warn!(%session, %error, "session teardown failed");
        }
    }
}

fn find_node<'a>(nodes: &'a [DialogueNode], id: &str) -> Option<&'a DialogueNode> {
    for node in nodes {
        if node.id.as_str() == id {
            return Some(node);
        }
        if let Some(found) = find_node(&node.children, id) {
            return Some(found);
        }
    }
    None
}

fn emit_turn(turn: &Turn, messages: &dyn MessageSink) {
    for message in &turn.messages {
        messages.emit(&message.text, message.step, message.level);
    }
}

#[async_trait]
impl<P: SessionProtocol> DialogueEngine for RemoteEngine<P> {
    async fn run(
        &self,
        tree: &DialogueTree,
        state: &mut DialogueState,
        events: &dyn EventSource,
        messages: &dyn MessageSink,
    ) -> Result<RunOutcome, EngineError> {
        let root_id = tree.nodes[0].id.clone();
        let ctx = TreeContext { kind: tree.kind, root_id: root_id.clone() };
        let torn_down = AtomicBool::new(false);

        let (session, mut turn) = self
            .protocol
            .start_session(tree)
            .await
            .map_err(|error| EngineError::Transport(error.to_string()))?;
        info!(%session, "remote dialogue session started");

        loop {
            emit_turn(&turn, messages);

            match turn.state {
                TurnState::AwaitingInput { ref node_id, .. } => {
                    let Some(node) = find_node(&tree.nodes, node_id) else {
                        let node_id = NodeId::new(node_id.clone());
                        self.teardown(session, &torn_down).await;
                        return Err(EngineError::EventSource {
                            node_id,
                            message: "server asked for a node this tree does not define"
                                .to_owned(),
                        });
                    };

                    let raw = match events.collect_raw(node, &ctx).await {
                        Ok(raw) => raw,
                        Err(error) => {
                            self.teardown(session, &torn_down).await;
                            return Err(error);
                        }
                    };
                    debug!(node_id = %node.id, silent = raw.is_none(), "relaying input upstream");

                    turn = match self.protocol.advance(session, ClientInput { text: raw }).await {
                        Ok(turn) => turn,
                        Err(error) => {
                            self.teardown(session, &torn_down).await;
                            return Err(EngineError::Transport(error.to_string()));
                        }
                    };
                }
                TurnState::Completed { value } => {
                    state.remember(&root_id, value.clone(), true);
                    self.teardown(session, &torn_down).await;
                    return Ok(RunOutcome::Completed { value });
                }
                TurnState::Exited { action } => {
                    self.teardown(session, &torn_down).await;
                    return Ok(RunOutcome::Exited { action });
                }
                TurnState::Failed { message } => {
                    self.teardown(session, &torn_down).await;
                    return Err(EngineError::Transport(message));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ServerMessage, TransportError, WireExpecting};
    use colloquy_core::machine::{Expecting, InMemoryMessageSink, RetrieveEvent};
    use colloquy_core::StepType;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct ScriptedProtocol {
        turns: Mutex<VecDeque<Turn>>,
        deletes: AtomicUsize,
        fail_advance: bool,
    }

    impl ScriptedProtocol {
        fn new(turns: Vec<Turn>) -> Self {
            Self { turns: Mutex::new(turns.into_iter().collect()), deletes: AtomicUsize::new(0), fail_advance: false }
        }

        fn next_turn(&self) -> Result<Turn, TransportError> {
            self.turns
                .lock()
                .expect("turns")
                .pop_front()
                .ok_or_else(|| TransportError::Protocol("scripted turns exhausted".to_owned()))
        }
    }

    #[async_trait]
    impl SessionProtocol for ScriptedProtocol {
        async fn start_session(
            &self,
            _tree: &DialogueTree,
        ) -> Result<(SessionId, Turn), TransportError> {
            Ok((SessionId::new(), self.next_turn()?))
        }

        async fn advance(
            &self,
            _session: SessionId,
            _input: ClientInput,
        ) -> Result<Turn, TransportError> {
            if self.fail_advance {
                return Err(TransportError::Status { status: 502 });
            }
            self.next_turn()
        }

        async fn delete_session(&self, _session: SessionId) -> Result<(), TransportError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct RawSource {
        inputs: Mutex<VecDeque<Option<String>>>,
    }

    impl RawSource {
        fn new(inputs: Vec<Option<&str>>) -> Self {
            Self {
                inputs: Mutex::new(
                    inputs.into_iter().map(|i| i.map(str::to_owned)).collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl EventSource for RawSource {
        async fn next_event(
            &self,
            node: &DialogueNode,
            _ctx: &TreeContext,
            _expecting: Expecting,
        ) -> Result<RetrieveEvent, EngineError> {
            Err(EngineError::EventSource {
                node_id: node.id.clone(),
                message: "remote runs consume raw input only".to_owned(),
            })
        }

        async fn collect_raw(
            &self,
            node: &DialogueNode,
            _ctx: &TreeContext,
        ) -> Result<Option<String>, EngineError> {
            self.inputs.lock().expect("inputs").pop_front().ok_or_else(|| {
                EngineError::EventSource {
                    node_id: node.id.clone(),
                    message: "raw inputs exhausted".to_owned(),
                }
            })
        }
    }

    fn email_tree() -> DialogueTree {
        DialogueTree::from_value(json!({
            "nodes": [{
                "id": "email",
                "kind": "email",
                "steps": {"start": [{"tasks": [{"type": "message", "text": "La tua email?"}]}]}
            }]
        }))
        .expect("tree")
    }

    fn prompt(text: &str) -> ServerMessage {
        ServerMessage { text: text.to_owned(), step: StepType::Start, level: 1 }
    }

    fn awaiting(node_id: &str) -> TurnState {
        TurnState::AwaitingInput {
            node_id: node_id.to_owned(),
            expecting: WireExpecting::Value,
        }
    }

    #[tokio::test]
    async fn relays_raw_input_and_completes_with_the_server_value() {
        let protocol = ScriptedProtocol::new(vec![
            Turn { messages: vec![prompt("La tua email?")], state: awaiting("email") },
            Turn {
                messages: vec![],
                state: TurnState::Completed { value: json!("a@b.it") },
            },
        ]);
        let engine = RemoteEngine::new(protocol);
        let tree = email_tree();
        let mut state = DialogueState::new();
        let sink = InMemoryMessageSink::default();
        let source = RawSource::new(vec![Some("a@b.it")]);

        let outcome = engine.run(&tree, &mut state, &source, &sink).await;

        assert_eq!(outcome, Ok(RunOutcome::Completed { value: json!("a@b.it") }));
        assert_eq!(sink.texts(), vec!["La tua email?"]);
        assert_eq!(state.entry(&NodeId::new("email")).expect("entry").value, json!("a@b.it"));
        assert_eq!(engine.protocol.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_exit_tears_the_session_down_once() {
        let protocol = ScriptedProtocol::new(vec![Turn {
            messages: vec![prompt("La tua email?")],
            state: TurnState::Exited { action: "handover".to_owned() },
        }]);
        let engine = RemoteEngine::new(protocol);
        let tree = email_tree();
        let mut state = DialogueState::new();
        let sink = InMemoryMessageSink::default();
        let source = RawSource::new(vec![]);

        let outcome = engine.run(&tree, &mut state, &source, &sink).await;

        assert_eq!(outcome, Ok(RunOutcome::Exited { action: "handover".to_owned() }));
        assert_eq!(engine.protocol.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failures_surface_and_still_tear_down() {
        let mut protocol = ScriptedProtocol::new(vec![Turn {
            messages: vec![prompt("La tua email?")],
            state: awaiting("email"),
        }]);
        protocol.fail_advance = true;
        let engine = RemoteEngine::new(protocol);
        let tree = email_tree();
        let mut state = DialogueState::new();
        let sink = InMemoryMessageSink::default();
        let source = RawSource::new(vec![Some("a@b.it")]);

        let outcome = engine.run(&tree, &mut state, &source, &sink).await;

        assert!(matches!(outcome, Err(EngineError::Transport(_))));
        assert_eq!(engine.protocol.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_server_node_is_a_protocol_violation() {
        let protocol = ScriptedProtocol::new(vec![Turn {
            messages: vec![],
            state: awaiting("not-in-this-tree"),
        }]);
        let engine = RemoteEngine::new(protocol);
        let tree = email_tree();
        let mut state = DialogueState::new();
        let sink = InMemoryMessageSink::default();
        let source = RawSource::new(vec![]);

        let outcome = engine.run(&tree, &mut state, &source, &sink).await;

        assert!(matches!(outcome, Err(EngineError::EventSource { .. })));
    }

    #[tokio::test]
    async fn silence_is_relayed_as_null_input() {
        let protocol = ScriptedProtocol::new(vec![
            Turn { messages: vec![prompt("La tua email?")], state: awaiting("email") },
            Turn {
                messages: vec![ServerMessage {
                    text: "Non ti sento.".to_owned(),
                    step: StepType::NoInput,
                    level: 1,
                }],
                state: awaiting("email"),
            },
            Turn { messages: vec![], state: TurnState::Completed { value: json!("a@b.it") } },
        ]);
        let engine = RemoteEngine::new(protocol);
        let tree = email_tree();
        let mut state = DialogueState::new();
        let sink = InMemoryMessageSink::default();
        let source = RawSource::new(vec![None, Some("a@b.it")]);

        let outcome = engine.run(&tree, &mut state, &source, &sink).await;

        assert!(matches!(outcome, Ok(RunOutcome::Completed { .. })));
        assert_eq!(sink.texts(), vec!["La tua email?", "Non ti sento."]);
    }
}
