//! Batch orchestrator
//!
//! Processes the work items of one run strictly in sequence. Per item:
//!
//! ```text
//! NotStarted → lookup → SkippedComplete
//!                     → FetchingInput → InputFailed            (fetch_failed)
//!                                     → Analyzing → Failed     (analysis_failed)
//!                                                 → Complete   (analysis_complete)
//! ```
//!
//! Every terminal state writes a definite status, so a re-run resumes
//! exactly where the previous one stopped. One item's failure never aborts
//! the batch; only configuration errors do, and those surface before any
//! item is touched.

use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use matchday_common::time::{format_match_date, Clock};

use crate::config::AnalysisConfig;
use crate::db::PredictionStore;
use crate::error::AnalysisError;
use crate::models::{
    AnalysisFailure, AnalysisResult, BatchSummary, ErrorKind, FindOptions, RecordFilter,
    RecordPatch, RecordStatus, SortField, TaskKind, WorkItemContext, WorkItemRecord,
};
use crate::services::conversation::ChunkedConversation;
use crate::services::match_source::MatchSource;

/// Terminal outcome of one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    Skipped,
    Failed,
}

/// One unit of work, per task kind
#[derive(Debug, Clone)]
enum BatchEntry {
    /// Fixture from the match source
    PreMatch(WorkItemContext),
    /// Stored record awaiting post-match analysis
    PostMatch(WorkItemRecord),
}

impl BatchEntry {
    fn label(&self) -> String {
        match self {
            BatchEntry::PreMatch(item) => item.key().to_string(),
            BatchEntry::PostMatch(record) => record.key.to_string(),
        }
    }
}

/// Drives batch runs for both task kinds
pub struct BatchOrchestrator {
    store: Arc<dyn PredictionStore>,
    source: Arc<dyn MatchSource>,
    conversation: ChunkedConversation,
    clock: Arc<dyn Clock>,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn PredictionStore>,
        source: Arc<dyn MatchSource>,
        conversation: ChunkedConversation,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            source,
            conversation,
            clock,
        }
    }

    /// Pre-match run over today's or tomorrow's fixtures
    pub async fn run_prediction_batch(
        &self,
        config: &AnalysisConfig,
        active_competitions: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, AnalysisError> {
        ensure_kind(config, TaskKind::PreMatch)?;
        let url = config
            .fixture_url
            .as_deref()
            .ok_or_else(|| AnalysisError::Config("Fixture URL is not configured".to_string()))?;

        let today = self.clock.today();
        let target_date = if config.fetch_today {
            today
        } else {
            today.succ_opt().unwrap_or(today)
        };

        info!(date = %format_match_date(target_date), url, "Fetching fixtures for prediction run");
        let items = self
            .source
            .fetch_work_items(url, active_competitions, target_date)
            .await?;

        self.run_batch(items, config, cancel).await
    }

    /// Pre-match run over an explicit list of work items
    pub async fn run_batch(
        &self,
        items: Vec<WorkItemContext>,
        config: &AnalysisConfig,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, AnalysisError> {
        ensure_kind(config, TaskKind::PreMatch)?;
        let entries = items.into_iter().map(BatchEntry::PreMatch).collect();
        Ok(self.run_entries(entries, config, cancel).await)
    }

    /// Post-match run over stored predictions for `date` (`DD-MM-YYYY`)
    pub async fn run_post_match_batch(
        &self,
        date: &str,
        config: &AnalysisConfig,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, AnalysisError> {
        ensure_kind(config, TaskKind::PostMatch)?;

        let filter = RecordFilter {
            date: Some(date.to_string()),
            predict_status: Some(true),
            post_match_status: Some(false),
            ..Default::default()
        };
        let options = FindOptions {
            sort: SortField::KickoffTime,
            ..Default::default()
        };
        let records = self.store.find_many(&filter, &options).await?;
        info!(date, pending = records.len(), "Loaded records for post-match run");

        let entries = records.into_iter().map(BatchEntry::PostMatch).collect();
        Ok(self.run_entries(entries, config, cancel).await)
    }

    async fn run_entries(
        &self,
        entries: Vec<BatchEntry>,
        config: &AnalysisConfig,
        cancel: &CancellationToken,
    ) -> BatchSummary {
        let total = entries.len();
        let mut summary = BatchSummary::new(total);
        info!(kind = %config.kind, total, "Batch run started");

        for (index, entry) in entries.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = total - index;
                warn!(remaining = summary.cancelled, "Batch run cancelled");
                break;
            }

            let label = entry.label();
            info!(item = index + 1, total, work_item = %label, "Processing work item");

            let outcome = match self.process(entry, config, cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(work_item = %label, error = %e, "Work item failed");
                    ItemOutcome::Failed
                }
            };

            match outcome {
                ItemOutcome::Succeeded => summary.succeeded += 1,
                ItemOutcome::Skipped => summary.skipped += 1,
                ItemOutcome::Failed => summary.failed += 1,
            }

            if index + 1 < total && !config.delay_between_matches.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = self.clock.sleep(config.delay_between_matches) => {}
                }
            }
        }

        info!(
            kind = %config.kind,
            total = summary.total,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Batch run finished"
        );
        summary
    }

    async fn process(
        &self,
        entry: &BatchEntry,
        config: &AnalysisConfig,
        cancel: &CancellationToken,
    ) -> Result<ItemOutcome, AnalysisError> {
        match entry {
            BatchEntry::PreMatch(item) => self.process_pre_match(item, config, cancel).await,
            BatchEntry::PostMatch(record) => self.process_post_match(record, config, cancel).await,
        }
    }

    async fn process_pre_match(
        &self,
        item: &WorkItemContext,
        config: &AnalysisConfig,
        cancel: &CancellationToken,
    ) -> Result<ItemOutcome, AnalysisError> {
        let existing = self.store.find_by_key(&item.key()).await?;
        if let Some(record) = &existing {
            if record.predict_status {
                info!(
                    work_item = %record.key,
                    status = %record.status,
                    "Already analysed, skipping"
                );
                return Ok(ItemOutcome::Skipped);
            }
        }

        let document = match &item.stats_link {
            Some(link) => self.source.fetch_input_document(link).await,
            None => None,
        }
        .filter(|doc| !doc.trim().is_empty());

        let Some(document) = document else {
            warn!(work_item = %item.key(), "No statistics document, recording fetch failure");
            let patch = fetch_failed_patch(TaskKind::PreMatch, item.stats_link.is_some());
            self.upsert(item, existing.as_ref(), patch).await?;
            return Ok(ItemOutcome::Failed);
        };

        let task = config.build_task(item.template_fields(), document.clone());
        let result = self.conversation.run(&task, cancel).await;
        let outcome = outcome_of(&result);
        log_result(&item.key().to_string(), &result);

        let patch = result_patch(TaskKind::PreMatch, result, document);
        self.upsert(item, existing.as_ref(), patch).await?;
        Ok(outcome)
    }

    async fn process_post_match(
        &self,
        record: &WorkItemRecord,
        config: &AnalysisConfig,
        cancel: &CancellationToken,
    ) -> Result<ItemOutcome, AnalysisError> {
        let id = record.id.ok_or_else(|| {
            AnalysisError::Store(matchday_common::Error::Internal(format!(
                "Record for {} has no id",
                record.key
            )))
        })?;

        let Some(link) = record.stats_link.as_deref() else {
            warn!(work_item = %record.key, "No stats link, skipping post-match analysis");
            self.update(id, status_patch(RecordStatus::PostAnalysisSkippedNoLink)).await?;
            return Ok(ItemOutcome::Skipped);
        };

        let Some(predictions) = &record.predictions else {
            warn!(work_item = %record.key, "No stored predictions, skipping post-match analysis");
            self.update(id, status_patch(RecordStatus::PostAnalysisSkippedNoPredictions)).await?;
            return Ok(ItemOutcome::Skipped);
        };

        let Some(stats) = self
            .source
            .fetch_input_document(link)
            .await
            .filter(|doc| !doc.trim().is_empty())
        else {
            warn!(work_item = %record.key, "Post-match statistics unavailable");
            self.update(id, fetch_failed_patch(TaskKind::PostMatch, true)).await?;
            return Ok(ItemOutcome::Failed);
        };

        let input = post_match_input(predictions, &stats);
        let task = config.build_task(record.context().template_fields(), input.clone());
        let result = self.conversation.run(&task, cancel).await;
        let outcome = outcome_of(&result);
        log_result(&record.key.to_string(), &result);

        self.update(id, result_patch(TaskKind::PostMatch, result, input)).await?;
        Ok(outcome)
    }

    /// Update the prior record in place, or insert a new one
    async fn upsert(
        &self,
        item: &WorkItemContext,
        existing: Option<&WorkItemRecord>,
        mut patch: RecordPatch,
    ) -> Result<(), AnalysisError> {
        match existing.and_then(|record| record.id) {
            Some(id) => {
                patch.competition = Some(item.competition.clone());
                patch.kickoff_time = Some(item.time.clone());
                patch.stats_link = Some(item.stats_link.clone());
                self.update(id, patch).await
            }
            None => {
                let mut record = WorkItemRecord::new(item, RecordStatus::PendingAnalysis);
                record.apply(&patch);
                self.store.insert(&record).await?;
                Ok(())
            }
        }
    }

    async fn update(&self, id: i64, patch: RecordPatch) -> Result<(), AnalysisError> {
        if self.store.update_by_id(id, &patch).await? {
            Ok(())
        } else {
            Err(AnalysisError::Store(matchday_common::Error::NotFound(format!(
                "Prediction record {}",
                id
            ))))
        }
    }
}

fn ensure_kind(config: &AnalysisConfig, expected: TaskKind) -> Result<(), AnalysisError> {
    if config.kind == expected {
        Ok(())
    } else {
        Err(AnalysisError::Config(format!(
            "Configuration was loaded for {} but the run is {}",
            config.kind, expected
        )))
    }
}

fn outcome_of(result: &AnalysisResult) -> ItemOutcome {
    if result.is_success() {
        ItemOutcome::Succeeded
    } else {
        ItemOutcome::Failed
    }
}

fn log_result(label: &str, result: &AnalysisResult) {
    match result {
        AnalysisResult::Success(_) => info!(work_item = %label, "Analysis complete"),
        AnalysisResult::Failure(failure) => error!(
            work_item = %label,
            kind = %failure.kind,
            details = %failure.message,
            "Analysis failed"
        ),
    }
}

/// Input for the post-match conversation: predictions followed by final statistics
pub fn post_match_input(predictions: &Value, stats_markdown: &str) -> String {
    let predictions =
        serde_json::to_string_pretty(predictions).unwrap_or_else(|_| predictions.to_string());
    format!(
        "PRE-MATCH PREDICTIONS:\n{}\n\nPOST-MATCH STATS:\n\n{}",
        predictions, stats_markdown
    )
}

fn status_patch(status: RecordStatus) -> RecordPatch {
    RecordPatch {
        status: Some(status),
        ..Default::default()
    }
}

fn fetch_failed_patch(kind: TaskKind, had_link: bool) -> RecordPatch {
    let message = if had_link {
        "Statistics document could not be fetched or was empty"
    } else {
        "No statistics link available"
    };
    RecordPatch {
        status: Some(kind.fetch_failed_status()),
        error_details: Some(Some(
            AnalysisFailure::new(ErrorKind::FetchError, message).to_error_details(),
        )),
        ..Default::default()
    }
}

/// Record changes for a finished conversation
///
/// Success stores the payload and clears diagnostics; failure keeps the
/// input document and the structured error details.
fn result_patch(kind: TaskKind, result: AnalysisResult, input_document: String) -> RecordPatch {
    match result {
        AnalysisResult::Success(payload) => {
            let mut patch = RecordPatch {
                status: Some(kind.complete_status()),
                markdown_content: Some(None),
                error_details: Some(None),
                ..Default::default()
            };
            match kind {
                TaskKind::PreMatch => {
                    patch.predict_status = Some(true);
                    patch.predictions = Some(Some(payload));
                }
                TaskKind::PostMatch => {
                    patch.post_match_status = Some(true);
                    patch.post_match_analysis = Some(Some(payload));
                }
            }
            patch
        }
        AnalysisResult::Failure(failure) => RecordPatch {
            status: Some(kind.failed_status()),
            markdown_content: Some(Some(input_document)),
            error_details: Some(Some(failure.to_error_details())),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_post_match_input_layout() {
        let input = post_match_input(&json!({"events": []}), "Final score 2-1");
        assert_eq!(
            input,
            "PRE-MATCH PREDICTIONS:\n{\n  \"events\": []\n}\n\nPOST-MATCH STATS:\n\nFinal score 2-1"
        );
    }

    #[test]
    fn test_success_patch_per_kind() {
        let pre = result_patch(
            TaskKind::PreMatch,
            AnalysisResult::Success(json!({"a": 1})),
            "doc".into(),
        );
        assert_eq!(pre.status, Some(RecordStatus::AnalysisComplete));
        assert_eq!(pre.predict_status, Some(true));
        assert_eq!(pre.predictions, Some(Some(json!({"a": 1}))));
        assert_eq!(pre.markdown_content, Some(None));

        let post = result_patch(
            TaskKind::PostMatch,
            AnalysisResult::Success(json!({"b": 2})),
            "doc".into(),
        );
        assert_eq!(post.status, Some(RecordStatus::PostAnalysisComplete));
        assert_eq!(post.post_match_status, Some(true));
        assert!(post.predictions.is_none());
    }

    #[test]
    fn test_failure_patch_keeps_document() {
        let result = AnalysisResult::failure(ErrorKind::MalformedJson, "bad");
        let patch = result_patch(TaskKind::PreMatch, result, "stats markdown".into());

        assert_eq!(patch.status, Some(RecordStatus::AnalysisFailed));
        assert_eq!(patch.markdown_content, Some(Some("stats markdown".to_string())));
        assert!(patch.predictions.is_none());
        assert_eq!(
            patch.error_details.flatten().map(|d| d["analysis_outcome"].clone()),
            Some(json!("malformed_json"))
        );
    }

    #[test]
    fn test_fetch_failed_patch() {
        let patch = fetch_failed_patch(TaskKind::PostMatch, true);
        assert_eq!(patch.status, Some(RecordStatus::PostAnalysisFetchFailed));
        assert!(patch.predictions.is_none());
    }
}
