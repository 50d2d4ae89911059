//! Scoring services - NER and LLM candidate producers
//!
//! This crate provides the two best-effort scoring passes that back up the
//! deterministic extractors:
//! - **Entity recognition** (`ner`) - span labelling via an external NER
//!   service, with spans re-parsed deterministically
//! - **LLM scoring** (`llm`) - structured candidate lists coaxed out of a
//!   chat-completion provider
//!
//! # Safety Principle
//!
//! Scorers only ever PROPOSE candidates. Every candidate still passes the
//! deterministic validator for its kind before fusion, so a hallucinated
//! date or a mis-labelled span can never reach dialogue memory.

pub mod llm;
pub mod ner;

pub use llm::{HttpLlmClient, LlmClient, LlmSlotScorer};
pub use ner::HttpEntityScorer;
