//! Turn classification
//!
//! Folds the raw result of one conversational turn into a [`TurnOutcome`].
//! Rules are applied in order: transport failure, prompt-level block, then
//! the primary candidate's completion reason.

use crate::error::AnalysisError;
use crate::models::{FinishReason, TurnOutcome};
use crate::services::gemini_client::TurnResponse;

/// Block reason value the service sends when nothing was blocked
const BLOCK_REASON_UNSPECIFIED: &str = "BLOCK_REASON_UNSPECIFIED";

/// Classify one turn
pub fn classify(result: Result<TurnResponse, AnalysisError>) -> TurnOutcome {
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            return TurnOutcome::TransportError {
                rate_limited: err.is_rate_limited(),
                detail: err.to_string(),
            }
        }
    };

    if let Some(reason) = response
        .block_reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty() && *r != BLOCK_REASON_UNSPECIFIED)
    {
        return TurnOutcome::Blocked {
            reason: reason.to_string(),
        };
    }

    let text = response.text.unwrap_or_default();
    match FinishReason::from_api(response.finish_reason.as_deref()) {
        None | Some(FinishReason::Stop) => TurnOutcome::Stop { text },
        Some(reason) => TurnOutcome::NonStopFinish {
            reason,
            partial_text: text,
        },
    }
}
