//! Remote session transport - server-delegated dialogue runs
//!
//! When a deployment keeps extraction and dialogue state on a central
//! server, this crate provides the client half: the wire protocol
//! (`protocol`) and a `DialogueEngine` implementation (`engine`) that relays
//! raw utterances upstream and renders the server's prompts locally.

pub mod engine;
pub mod protocol;

pub use engine::RemoteEngine;
pub use protocol::{
    ClientInput, HttpSessionClient, ServerMessage, SessionId, SessionProtocol, TransportError,
    Turn, TurnState, WireExpecting,
};
