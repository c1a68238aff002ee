//! Analysis services
//!
//! Leaf-first: rate gate, AI client, classification and extraction, the
//! chunked conversation, the match source and the batch orchestrator.

pub mod batch_orchestrator;
pub mod conversation;
pub mod gemini_client;
pub mod json_extractor;
pub mod match_source;
pub mod prompt_template;
pub mod rate_gate;
pub mod response_classifier;

pub use batch_orchestrator::{BatchOrchestrator, ItemOutcome};
pub use conversation::{chunk_document, ChunkedConversation};
pub use gemini_client::{
    AiService, AiSession, GeminiClient, GenerationDirective, TurnResponse,
};
pub use match_source::{HttpMatchSource, MatchSource};
pub use rate_gate::{RateBudget, RateGate};
