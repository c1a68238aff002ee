//! Turn and analysis outcomes
//!
//! Completion reasons and error kinds are closed enumerations; nothing
//! downstream of the response classifier compares strings.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Why the AI service stopped generating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Normal completion
    Stop,
    /// Output token limit reached
    MaxTokens,
    Safety,
    Recitation,
    Language,
    Blocklist,
    ProhibitedContent,
    Spii,
    /// Any reason this client does not know by name
    Other(String),
}

impl FinishReason {
    /// Parse the service's reason name; `None` for absent or unspecified
    pub fn from_api(value: Option<&str>) -> Option<Self> {
        let value = value?.trim();
        let reason = match value.to_ascii_uppercase().as_str() {
            "" | "FINISH_REASON_UNSPECIFIED" => return None,
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::MaxTokens,
            "SAFETY" => FinishReason::Safety,
            "RECITATION" => FinishReason::Recitation,
            "LANGUAGE" => FinishReason::Language,
            "BLOCKLIST" => FinishReason::Blocklist,
            "PROHIBITED_CONTENT" => FinishReason::ProhibitedContent,
            "SPII" => FinishReason::Spii,
            _ => FinishReason::Other(value.to_string()),
        };
        Some(reason)
    }

    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "STOP",
            FinishReason::MaxTokens => "MAX_TOKENS",
            FinishReason::Safety => "SAFETY",
            FinishReason::Recitation => "RECITATION",
            FinishReason::Language => "LANGUAGE",
            FinishReason::Blocklist => "BLOCKLIST",
            FinishReason::ProhibitedContent => "PROHIBITED_CONTENT",
            FinishReason::Spii => "SPII",
            FinishReason::Other(name) => name,
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single conversational turn
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Stop { text: String },
    Blocked { reason: String },
    NonStopFinish { reason: FinishReason, partial_text: String },
    TransportError { detail: String, rate_limited: bool },
}

/// Failure categories persisted with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigurationError,
    FetchError,
    Blocked,
    Truncated,
    IncompleteGeneration,
    MalformedJson,
    EmptyOutput,
    TransportError,
    RateLimited,
    NoInputData,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigurationError => "configuration_error",
            ErrorKind::FetchError => "fetch_error",
            ErrorKind::Blocked => "blocked",
            ErrorKind::Truncated => "truncated",
            ErrorKind::IncompleteGeneration => "incomplete_generation",
            ErrorKind::MalformedJson => "malformed_json",
            ErrorKind::EmptyOutput => "empty_output",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::NoInputData => "no_input_data",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A definite, typed analysis failure
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Model output retained for diagnosis (partial text, unparsable JSON)
    pub raw_output: Option<String>,
    pub finish_reason: Option<FinishReason>,
    pub block_reason: Option<String>,
}

impl AnalysisFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw_output: None,
            finish_reason: None,
            block_reason: None,
        }
    }

    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        self.raw_output = Some(raw.into());
        self
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn with_block_reason(mut self, reason: impl Into<String>) -> Self {
        self.block_reason = Some(reason.into());
        self
    }

    /// JSON stored in a record's `error_details`
    pub fn to_error_details(&self) -> Value {
        let mut details = Map::new();
        details.insert("analysis_outcome".to_string(), json!(self.kind.as_str()));
        details.insert("details".to_string(), json!(self.message));
        if let Some(raw) = &self.raw_output {
            details.insert("raw_output".to_string(), json!(raw));
        }
        if let Some(reason) = &self.finish_reason {
            details.insert("finish_reason".to_string(), json!(reason.as_str()));
        }
        if let Some(reason) = &self.block_reason {
            details.insert("block_reason".to_string(), json!(reason));
        }
        Value::Object(details)
    }
}

impl fmt::Display for AnalysisFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one chunked conversation
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Success(Value),
    Failure(AnalysisFailure),
}

impl AnalysisResult {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        AnalysisResult::Failure(AnalysisFailure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResult::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            AnalysisResult::Success(_) => None,
            AnalysisResult::Failure(failure) => Some(failure.kind),
        }
    }
}
