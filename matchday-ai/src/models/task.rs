//! Conversation task definition
//!
//! A [`ConversationTask`] is built once per work item and consumed once by
//! the chunked conversation. [`TaskKind`] selects which prompts, schema and
//! record fields apply.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::RecordStatus;

/// Which analysis a batch performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Predict events for upcoming fixtures
    PreMatch,
    /// Compare stored predictions with the final statistics
    PostMatch,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::PreMatch => "pre_match",
            TaskKind::PostMatch => "post_match",
        }
    }

    /// Settings key holding the initial prompt template
    pub fn initial_prompt_key(&self) -> &'static str {
        match self {
            TaskKind::PreMatch => "predict_initial_prompt",
            TaskKind::PostMatch => "post_match_initial_prompt",
        }
    }

    /// Settings key holding the final instruction
    pub fn final_prompt_key(&self) -> &'static str {
        match self {
            TaskKind::PreMatch => "predict_final_prompt",
            TaskKind::PostMatch => "post_match_final_prompt",
        }
    }

    /// Settings key holding the JSON output schema
    pub fn schema_key(&self) -> &'static str {
        match self {
            TaskKind::PreMatch => "match_prediction_schema",
            TaskKind::PostMatch => "post_match_analysis_schema",
        }
    }

    pub fn fetch_failed_status(&self) -> RecordStatus {
        match self {
            TaskKind::PreMatch => RecordStatus::FetchFailed,
            TaskKind::PostMatch => RecordStatus::PostAnalysisFetchFailed,
        }
    }

    pub fn failed_status(&self) -> RecordStatus {
        match self {
            TaskKind::PreMatch => RecordStatus::AnalysisFailed,
            TaskKind::PostMatch => RecordStatus::PostAnalysisFailed,
        }
    }

    pub fn complete_status(&self) -> RecordStatus {
        match self {
            TaskKind::PreMatch => RecordStatus::AnalysisComplete,
            TaskKind::PostMatch => RecordStatus::PostAnalysisComplete,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional generation knobs sent with the final turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
}

/// Request quotas applied by the rate gate; `None` means unlimited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub per_minute: Option<u32>,
    pub per_day: Option<u32>,
}

/// Everything needed to run one chunked conversation
#[derive(Debug, Clone)]
pub struct ConversationTask {
    pub kind: TaskKind,
    /// Values substituted into `prompt_template`
    pub context: BTreeMap<String, String>,
    pub input_document: String,
    pub prompt_template: String,
    pub final_instruction: String,
    pub output_schema: Value,
    pub model_id: String,
    pub chunk_size_chars: usize,
    pub generation: GenerationOptions,
    /// Exposed to templates as `{number_of_predicted_events}`
    pub requested_result_count: Option<u32>,
    pub rate_limits: RateLimits,
}

impl ConversationTask {
    /// Template values including the requested result count
    pub fn template_values(&self) -> BTreeMap<String, String> {
        let mut values = self.context.clone();
        if let Some(count) = self.requested_result_count {
            values.insert("number_of_predicted_events".to_string(), count.to_string());
        }
        values
    }
}
