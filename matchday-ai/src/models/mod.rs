//! Data models for matchday-ai

pub mod analysis;
pub mod match_record;
pub mod summary;
pub mod task;

pub use analysis::{AnalysisFailure, AnalysisResult, ErrorKind, FinishReason, TurnOutcome};
pub use match_record::{
    FindOptions, MatchKey, RecordFilter, RecordPatch, RecordStatus, SortField, WorkItemContext,
    WorkItemRecord,
};
pub use summary::BatchSummary;
pub use task::{ConversationTask, GenerationOptions, RateLimits, TaskKind};
