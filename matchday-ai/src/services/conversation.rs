//! Chunked multi-turn conversation
//!
//! Feeds an oversized input document to the AI service across several turns
//! and requests a schema-constrained JSON result on the final turn:
//!
//! 1. initial instruction (templated from the work item context)
//! 2. `Data Part i/N` for every chunk of the document
//! 3. final instruction with the structured output directive
//!
//! Every send passes through the shared [`RateGate`] and carries a timeout.
//! One fresh session is opened per task.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::models::{
    AnalysisFailure, AnalysisResult, ConversationTask, ErrorKind, FinishReason, TurnOutcome,
};
use crate::services::gemini_client::{AiService, AiSession, GenerationDirective};
use crate::services::json_extractor;
use crate::services::prompt_template::render_template;
use crate::services::rate_gate::RateGate;
use crate::services::response_classifier::classify;

/// Runs [`ConversationTask`]s against an AI service
pub struct ChunkedConversation {
    ai: Arc<dyn AiService>,
    gate: Arc<RateGate>,
    turn_timeout: Duration,
}

impl ChunkedConversation {
    pub fn new(ai: Arc<dyn AiService>, gate: Arc<RateGate>, turn_timeout: Duration) -> Self {
        Self {
            ai,
            gate,
            turn_timeout,
        }
    }

    /// Run the full protocol for one task
    ///
    /// Never returns an error: every exit path is a definite
    /// [`AnalysisResult`].
    pub async fn run(&self, task: &ConversationTask, cancel: &CancellationToken) -> AnalysisResult {
        if task.input_document.trim().is_empty() {
            return AnalysisResult::failure(ErrorKind::NoInputData, "Input document is empty");
        }

        let chunks = chunk_document(&task.input_document, task.chunk_size_chars);
        let total = chunks.len();
        let mut session = self.ai.create_session(&task.model_id);

        let initial = match render_template(&task.prompt_template, &task.template_values()) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(
                    kind = %task.kind,
                    error = %e,
                    "Prompt formatting failed, sending raw template"
                );
                task.prompt_template.clone()
            }
        };

        info!(kind = %task.kind, model = %task.model_id, chunks = total, "Starting conversation");

        match self
            .send_turn(&mut session, task, &initial, None, cancel)
            .await
        {
            Ok(TurnOutcome::Stop { .. }) => {}
            Ok(TurnOutcome::NonStopFinish { reason, .. }) => {
                warn!(reason = %reason, "Initial turn finished early, continuing");
            }
            Ok(outcome) => return AnalysisResult::Failure(abort_failure(outcome, "initial prompt")),
            Err(failure) => return AnalysisResult::Failure(failure),
        }

        for (index, chunk) in chunks.iter().enumerate() {
            let part = index + 1;
            let message = format!("Data Part {}/{}:\n\n{}", part, total, chunk);
            debug!(part, total, chars = chunk.chars().count(), "Sending data part");

            match self
                .send_turn(&mut session, task, &message, None, cancel)
                .await
            {
                Ok(TurnOutcome::Stop { .. }) => {}
                Ok(TurnOutcome::NonStopFinish { reason, .. }) => {
                    warn!(part, total, reason = %reason, "Data part finished early, continuing");
                }
                Ok(outcome) => {
                    let stage = format!("data part {}/{}", part, total);
                    return AnalysisResult::Failure(abort_failure(outcome, &stage));
                }
                Err(failure) => return AnalysisResult::Failure(failure),
            }
        }

        let directive = GenerationDirective {
            response_schema: task.output_schema.clone(),
            options: task.generation,
        };

        let outcome = match self
            .send_turn(&mut session, task, &task.final_instruction, Some(&directive), cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(failure) => return AnalysisResult::Failure(failure),
        };

        match outcome {
            TurnOutcome::Stop { text } => {
                let result = json_extractor::extract(&text);
                if result.is_success() {
                    info!(kind = %task.kind, "Structured result received");
                }
                result
            }
            TurnOutcome::NonStopFinish {
                reason: FinishReason::MaxTokens,
                partial_text,
            } => AnalysisResult::Failure(
                AnalysisFailure::new(ErrorKind::Truncated, "Output token limit reached")
                    .with_raw_output(partial_text)
                    .with_finish_reason(FinishReason::MaxTokens),
            ),
            TurnOutcome::NonStopFinish {
                reason,
                partial_text,
            } => AnalysisResult::Failure(
                AnalysisFailure::new(
                    ErrorKind::IncompleteGeneration,
                    format!("Generation stopped with reason {}", reason),
                )
                .with_raw_output(partial_text)
                .with_finish_reason(reason),
            ),
            outcome => AnalysisResult::Failure(abort_failure(outcome, "final instruction")),
        }
    }

    /// Gate, send and classify one turn
    ///
    /// `Err` only for cancellation; everything else is a [`TurnOutcome`].
    async fn send_turn(
        &self,
        session: &mut Box<dyn AiSession>,
        task: &ConversationTask,
        message: &str,
        directive: Option<&GenerationDirective>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, AnalysisFailure> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = self.gate.acquire_for(&task.rate_limits, &task.model_id) => {}
        }

        let send = tokio::time::timeout(self.turn_timeout, session.send(message, directive));
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            result = send => match result {
                Ok(result) => result,
                Err(_) => Err(AnalysisError::Timeout(self.turn_timeout.as_secs())),
            },
        };

        Ok(classify(result))
    }
}

fn cancelled() -> AnalysisFailure {
    AnalysisFailure::new(ErrorKind::Cancelled, "Run cancelled")
}

/// Failure for a turn that aborts the conversation (block or transport)
fn abort_failure(outcome: TurnOutcome, stage: &str) -> AnalysisFailure {
    match outcome {
        TurnOutcome::Blocked { reason } => AnalysisFailure::new(
            ErrorKind::Blocked,
            format!("Prompt blocked during {}: {}", stage, reason),
        )
        .with_block_reason(reason),
        TurnOutcome::TransportError {
            detail,
            rate_limited,
        } => {
            let kind = if rate_limited {
                ErrorKind::RateLimited
            } else {
                ErrorKind::TransportError
            };
            AnalysisFailure::new(kind, format!("Request failed during {}: {}", stage, detail))
        }
        TurnOutcome::NonStopFinish {
            reason,
            partial_text,
        } => AnalysisFailure::new(
            ErrorKind::IncompleteGeneration,
            format!("Generation stopped during {} with reason {}", stage, reason),
        )
        .with_raw_output(partial_text)
        .with_finish_reason(reason),
        TurnOutcome::Stop { text } => AnalysisFailure::new(
            ErrorKind::IncompleteGeneration,
            format!("Unexpected stop during {}", stage),
        )
        .with_raw_output(text),
    }
}

/// Split `document` into consecutive parts of at most `chunk_size_chars` characters
pub fn chunk_document(document: &str, chunk_size_chars: usize) -> Vec<&str> {
    let chunk_size_chars = chunk_size_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (offset, _) in document.char_indices() {
        if count == chunk_size_chars {
            chunks.push(&document[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < document.len() {
        chunks.push(&document[start..]);
    }

    chunks
}
