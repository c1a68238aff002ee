//! Batch orchestrator integration tests
//!
//! Real SQLite store, scripted AI service, in-memory match source and a
//! manual clock.

mod helpers;

use serde_json::json;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use helpers::{
    build_orchestrator, create_test_db, fixture, seed_analysis_settings, test_clock,
    FakeMatchSource, Reply, ScriptedAi,
};
use matchday_ai::config::AnalysisConfig;
use matchday_ai::db::settings::set_setting;
use matchday_ai::db::{PredictionStore, SqlitePredictionStore};
use matchday_ai::error::AnalysisError;
use matchday_ai::models::{
    BatchSummary, FindOptions, MatchKey, RecordFilter, RecordStatus, TaskKind, WorkItemRecord,
};

const DELAY: Duration = Duration::from_secs(15);

async fn setup(kind: TaskKind) -> (tempfile::TempDir, SqlitePool, AnalysisConfig) {
    let (dir, pool) = create_test_db().await.unwrap();
    seed_analysis_settings(&pool, kind).await.unwrap();
    // Unlisted model: no per-call pacing sleeps on the manual clock
    set_setting(&pool, "model", "gemini-test").await.unwrap();
    let config = AnalysisConfig::load(&pool, kind).await.unwrap();
    (dir, pool, config)
}

fn store(pool: &SqlitePool) -> SqlitePredictionStore {
    SqlitePredictionStore::new(pool.clone(), 1000)
}

async fn record(pool: &SqlitePool, home: &str, away: &str) -> WorkItemRecord {
    let key = MatchKey {
        date: "14-06-2025".to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
    };
    store(pool)
        .find_by_key(&key)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("no record for {}", key))
}

fn premier_league() -> BTreeSet<String> {
    ["Premier League".to_string()].into_iter().collect()
}

#[tokio::test]
async fn tc_batch_001_success_is_persisted_as_complete() {
    // Given: one fixture with a statistics document
    let (_dir, pool, config) = setup(TaskKind::PreMatch).await;
    let ai = ScriptedAi::new();
    ai.push_final(Reply::stop(r#"{"events": [{"minute": 12}]}"#));
    let source = Arc::new(
        FakeMatchSource::new().with_document("https://stats.test/arsenal", "# Arsenal form"),
    );
    let orchestrator = build_orchestrator(&pool, &ai, source, test_clock());

    // When
    let summary = orchestrator
        .run_batch(vec![fixture("Arsenal", "Chelsea")], &config, &CancellationToken::new())
        .await
        .unwrap();

    // Then
    assert_eq!(summary.succeeded, 1);
    let stored = record(&pool, "Arsenal", "Chelsea").await;
    assert_eq!(stored.status, RecordStatus::AnalysisComplete);
    assert!(stored.predict_status);
    assert_eq!(stored.predictions, Some(json!({"events": [{"minute": 12}]})));
    assert_eq!(stored.markdown_content, None);
    assert_eq!(stored.error_details, None);
    assert_eq!(stored.competition, "Premier League");
}

#[tokio::test]
async fn tc_batch_002_completed_item_is_skipped_on_rerun() {
    // Given: a batch that already completed its only item
    let (_dir, pool, config) = setup(TaskKind::PreMatch).await;
    let ai = ScriptedAi::new();
    let source = Arc::new(
        FakeMatchSource::new().with_document("https://stats.test/arsenal", "# Arsenal form"),
    );
    let orchestrator = build_orchestrator(&pool, &ai, source.clone(), test_clock());
    let cancel = CancellationToken::new();
    orchestrator
        .run_batch(vec![fixture("Arsenal", "Chelsea")], &config, &cancel)
        .await
        .unwrap();
    let sessions_after_first_run = ai.sessions_opened();

    // When: the same item is processed again
    let summary = orchestrator
        .run_batch(vec![fixture("Arsenal", "Chelsea")], &config, &cancel)
        .await
        .unwrap();

    // Then: no fetch, no session, one skip
    assert_eq!(summary.skipped, 1);
    assert_eq!(ai.sessions_opened(), sessions_after_first_run);
    assert_eq!(source.fetched_links().len(), 1);
}

#[tokio::test]
async fn tc_batch_003_missing_document_records_fetch_failure() {
    // Given: a fixture whose statistics page returns nothing
    let (_dir, pool, config) = setup(TaskKind::PreMatch).await;
    let ai = ScriptedAi::new();
    let orchestrator =
        build_orchestrator(&pool, &ai, Arc::new(FakeMatchSource::new()), test_clock());

    // When
    let summary = orchestrator
        .run_batch(vec![fixture("Leeds", "Everton")], &config, &CancellationToken::new())
        .await
        .unwrap();

    // Then: fetch_failed is persisted and the AI service is never contacted
    assert_eq!(summary.failed, 1);
    assert_eq!(ai.sessions_opened(), 0);
    let stored = record(&pool, "Leeds", "Everton").await;
    assert_eq!(stored.status, RecordStatus::FetchFailed);
    assert!(!stored.predict_status);
    assert_eq!(stored.error_details.unwrap()["analysis_outcome"], "fetch_error");
}

#[tokio::test]
async fn tc_batch_004_truncated_output_keeps_document_and_details() {
    // Given: the final turn hits the output token limit
    let (_dir, pool, config) = setup(TaskKind::PreMatch).await;
    let ai = ScriptedAi::new();
    ai.push_final(Reply::finish(r#"{"events": ["#, "MAX_TOKENS"));
    let source = Arc::new(
        FakeMatchSource::new().with_document("https://stats.test/arsenal", "# Arsenal form"),
    );
    let orchestrator = build_orchestrator(&pool, &ai, source, test_clock());

    // When
    let summary = orchestrator
        .run_batch(vec![fixture("Arsenal", "Chelsea")], &config, &CancellationToken::new())
        .await
        .unwrap();

    // Then
    assert_eq!(summary.failed, 1);
    let stored = record(&pool, "Arsenal", "Chelsea").await;
    assert_eq!(stored.status, RecordStatus::AnalysisFailed);
    assert_eq!(stored.markdown_content.as_deref(), Some("# Arsenal form"));
    let details = stored.error_details.unwrap();
    assert_eq!(details["analysis_outcome"], "truncated");
    assert_eq!(details["finish_reason"], "MAX_TOKENS");
    assert_eq!(details["raw_output"], r#"{"events": ["#);
}

#[tokio::test]
async fn tc_batch_005_blocked_prompt_is_recorded() {
    let (_dir, pool, config) = setup(TaskKind::PreMatch).await;
    let ai = ScriptedAi::new();
    ai.override_turn(1, 0, Reply::Blocked("PROHIBITED_CONTENT".to_string()));
    let source = Arc::new(
        FakeMatchSource::new().with_document("https://stats.test/arsenal", "# Arsenal form"),
    );
    let orchestrator = build_orchestrator(&pool, &ai, source, test_clock());

    orchestrator
        .run_batch(vec![fixture("Arsenal", "Chelsea")], &config, &CancellationToken::new())
        .await
        .unwrap();

    let stored = record(&pool, "Arsenal", "Chelsea").await;
    assert_eq!(stored.status, RecordStatus::AnalysisFailed);
    let details = stored.error_details.unwrap();
    assert_eq!(details["analysis_outcome"], "blocked");
    assert_eq!(details["block_reason"], "PROHIBITED_CONTENT");
}

#[tokio::test]
async fn tc_batch_006_failed_item_is_retried_and_updated_in_place() {
    // Given: a first run that failed on malformed output
    let (_dir, pool, config) = setup(TaskKind::PreMatch).await;
    let ai = ScriptedAi::new();
    ai.push_final(Reply::stop("not json"));
    ai.push_final(Reply::stop(r#"{"events": []}"#));
    let source = Arc::new(
        FakeMatchSource::new().with_document("https://stats.test/arsenal", "# Arsenal form"),
    );
    let orchestrator = build_orchestrator(&pool, &ai, source, test_clock());
    let cancel = CancellationToken::new();
    orchestrator
        .run_batch(vec![fixture("Arsenal", "Chelsea")], &config, &cancel)
        .await
        .unwrap();
    let first = record(&pool, "Arsenal", "Chelsea").await;
    assert_eq!(first.status, RecordStatus::AnalysisFailed);

    // When: the next run succeeds
    let mut rescheduled = fixture("Arsenal", "Chelsea");
    rescheduled.time = "17:30".to_string();
    orchestrator
        .run_batch(vec![rescheduled], &config, &cancel)
        .await
        .unwrap();

    // Then: the same row is updated and diagnostics are cleared
    let second = record(&pool, "Arsenal", "Chelsea").await;
    assert_eq!(second.id, first.id);
    assert_eq!(second.status, RecordStatus::AnalysisComplete);
    assert_eq!(second.kickoff_time, "17:30");
    assert_eq!(second.markdown_content, None);
    assert_eq!(second.error_details, None);
    let all = store(&pool)
        .find_many(&RecordFilter::default(), &FindOptions::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn tc_batch_007_items_are_paced_and_failures_isolated() {
    // Given: three fixtures, the middle one without a document
    let (_dir, pool, config) = setup(TaskKind::PreMatch).await;
    let ai = ScriptedAi::new();
    let source = Arc::new(
        FakeMatchSource::new()
            .with_document("https://stats.test/arsenal", "# Arsenal")
            .with_document("https://stats.test/fulham", "# Fulham"),
    );
    let clock = test_clock();
    let orchestrator = build_orchestrator(&pool, &ai, source, clock.clone());

    // When
    let items = vec![
        fixture("Arsenal", "Chelsea"),
        fixture("Leeds", "Everton"),
        fixture("Fulham", "Brentford"),
    ];
    let summary = orchestrator
        .run_batch(items, &config, &CancellationToken::new())
        .await
        .unwrap();

    // Then: the batch finishes, with a pause between items but not after the last
    assert_eq!(
        summary,
        BatchSummary {
            total: 3,
            succeeded: 2,
            skipped: 0,
            failed: 1,
            cancelled: 0,
        }
    );
    let pauses = clock.sleeps().into_iter().filter(|d| *d == DELAY).count();
    assert_eq!(pauses, 2);
    assert_eq!(
        record(&pool, "Fulham", "Brentford").await.status,
        RecordStatus::AnalysisComplete
    );
}

#[tokio::test]
async fn tc_batch_008_cancel_before_start_touches_nothing() {
    let (_dir, pool, config) = setup(TaskKind::PreMatch).await;
    let ai = ScriptedAi::new();
    let orchestrator =
        build_orchestrator(&pool, &ai, Arc::new(FakeMatchSource::new()), test_clock());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = orchestrator
        .run_batch(
            vec![fixture("Arsenal", "Chelsea"), fixture("Leeds", "Everton")],
            &config,
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(summary.cancelled, 2);
    assert_eq!(summary.processed(), 0);
    let all = store(&pool)
        .find_many(&RecordFilter::default(), &FindOptions::default())
        .await
        .unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn tc_batch_009_cancel_mid_item_records_and_stops() {
    // Given: the second item's final turn never answers
    let (_dir, pool, config) = setup(TaskKind::PreMatch).await;
    let ai = ScriptedAi::new();
    ai.override_turn(2, 2, Reply::Hang);
    let source = Arc::new(
        FakeMatchSource::new()
            .with_document("https://stats.test/arsenal", "# Arsenal")
            .with_document("https://stats.test/leeds", "# Leeds")
            .with_document("https://stats.test/fulham", "# Fulham"),
    );
    let orchestrator = build_orchestrator(&pool, &ai, source, test_clock());
    let cancel = CancellationToken::new();

    // When: the operator cancels while it waits
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let items = vec![
        fixture("Arsenal", "Chelsea"),
        fixture("Leeds", "Everton"),
        fixture("Fulham", "Brentford"),
    ];
    let summary = orchestrator.run_batch(items, &config, &cancel).await.unwrap();

    // Then: first done, second recorded as cancelled, third untouched
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.cancelled, 1);
    let interrupted = record(&pool, "Leeds", "Everton").await;
    assert_eq!(interrupted.status, RecordStatus::AnalysisFailed);
    assert_eq!(interrupted.error_details.unwrap()["analysis_outcome"], "cancelled");
    let untouched = store(&pool)
        .find_by_key(&fixture("Fulham", "Brentford").key())
        .await
        .unwrap();
    assert!(untouched.is_none());
}

#[tokio::test]
async fn tc_batch_010_prediction_run_uses_active_competitions_and_day() {
    // Given: fixtures in two competitions, only one active, tomorrow selected
    let (_dir, pool, _) = setup(TaskKind::PreMatch).await;
    set_setting(&pool, "fetch_today", "false").await.unwrap();
    let config = AnalysisConfig::load(&pool, TaskKind::PreMatch).await.unwrap();
    assert_eq!(config.fixture_url.as_deref(), Some("https://fixtures.test/tomorrow"));

    let mut cup_tie = fixture("Wrexham", "Stockport");
    cup_tie.competition = "FA Cup".to_string();
    let source = Arc::new(
        FakeMatchSource::new()
            .with_fixture(fixture("Arsenal", "Chelsea"))
            .with_fixture(cup_tie)
            .with_document("https://stats.test/arsenal", "# Arsenal"),
    );
    let ai = ScriptedAi::new();
    let orchestrator = build_orchestrator(&pool, &ai, source.clone(), test_clock());

    // When
    let summary = orchestrator
        .run_prediction_batch(&config, &premier_league(), &CancellationToken::new())
        .await
        .unwrap();

    // Then: only the active competition is analysed, stamped with tomorrow's date
    assert_eq!(summary.total, 1);
    assert_eq!(
        source.requested_dates(),
        vec![chrono::NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()]
    );
    let key = MatchKey {
        date: "15-06-2025".to_string(),
        home_team: "Arsenal".to_string(),
        away_team: "Chelsea".to_string(),
    };
    let stored = store(&pool).find_by_key(&key).await.unwrap().unwrap();
    assert_eq!(stored.status, RecordStatus::AnalysisComplete);
}

#[tokio::test]
async fn tc_batch_011_kind_mismatch_is_config_error() {
    let (_dir, pool, post_config) = setup(TaskKind::PostMatch).await;
    let orchestrator = build_orchestrator(
        &pool,
        &ScriptedAi::new(),
        Arc::new(FakeMatchSource::new()),
        test_clock(),
    );

    let err = orchestrator
        .run_batch(vec![fixture("Arsenal", "Chelsea")], &post_config, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Config(_)));
}

#[tokio::test]
async fn tc_batch_012_post_match_analyses_predicted_records() {
    // Given: a stored prediction and the final statistics
    let (_dir, pool, pre_config) = setup(TaskKind::PreMatch).await;
    seed_analysis_settings(&pool, TaskKind::PostMatch).await.unwrap();
    let post_config = AnalysisConfig::load(&pool, TaskKind::PostMatch).await.unwrap();

    let ai = ScriptedAi::new();
    ai.push_final(Reply::stop(r#"{"events": [{"minute": 30}]}"#));
    ai.push_final(Reply::stop(r#"{"events": [{"minute": 30, "correct": true}]}"#));
    let source = Arc::new(
        FakeMatchSource::new().with_document("https://stats.test/arsenal", "Final score 2-1"),
    );
    let orchestrator = build_orchestrator(&pool, &ai, source, test_clock());
    let cancel = CancellationToken::new();
    orchestrator
        .run_batch(vec![fixture("Arsenal", "Chelsea")], &pre_config, &cancel)
        .await
        .unwrap();

    // When
    let summary = orchestrator
        .run_post_match_batch("14-06-2025", &post_config, &cancel)
        .await
        .unwrap();

    // Then: the predictions precede the statistics in the data parts
    assert_eq!(summary.succeeded, 1);
    let post_session = ai.sent_in_session(2);
    assert_eq!(post_session[0].text, "Review predictions for Arsenal vs Chelsea");
    assert!(post_session[1].text.contains("PRE-MATCH PREDICTIONS:"));
    assert!(post_session[1].text.contains("POST-MATCH STATS:\n\nFinal score 2-1"));

    let stored = record(&pool, "Arsenal", "Chelsea").await;
    assert_eq!(stored.status, RecordStatus::PostAnalysisComplete);
    assert!(stored.post_match_status);
    assert_eq!(
        stored.post_match_analysis,
        Some(json!({"events": [{"minute": 30, "correct": true}]}))
    );
    assert_eq!(stored.predictions, Some(json!({"events": [{"minute": 30}]})));
    assert!(stored.markdown_content.is_none());

    // A second post-match run finds nothing pending
    let again = orchestrator
        .run_post_match_batch("14-06-2025", &post_config, &cancel)
        .await
        .unwrap();
    assert_eq!(again.total, 0);
}

#[tokio::test]
async fn tc_batch_013_post_match_skips_and_fetch_failures() {
    // Given: three predicted records; no link, no predictions, unavailable stats
    let (_dir, pool, post_config) = setup(TaskKind::PostMatch).await;
    let store = store(&pool);

    let mut no_link =
        WorkItemRecord::new(&fixture("Leeds", "Everton"), RecordStatus::AnalysisComplete);
    no_link.stats_link = None;
    no_link.predict_status = true;
    no_link.predictions = Some(json!({"events": []}));

    let mut no_predictions =
        WorkItemRecord::new(&fixture("Fulham", "Brentford"), RecordStatus::AnalysisComplete);
    no_predictions.predict_status = true;

    let mut no_stats =
        WorkItemRecord::new(&fixture("Arsenal", "Chelsea"), RecordStatus::AnalysisComplete);
    no_stats.predict_status = true;
    no_stats.predictions = Some(json!({"events": []}));

    for record in [&no_link, &no_predictions, &no_stats] {
        store.insert(record).await.unwrap();
    }

    let ai = ScriptedAi::new();
    let orchestrator =
        build_orchestrator(&pool, &ai, Arc::new(FakeMatchSource::new()), test_clock());

    // When
    let summary = orchestrator
        .run_post_match_batch("14-06-2025", &post_config, &CancellationToken::new())
        .await
        .unwrap();

    // Then
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(ai.sessions_opened(), 0);
    assert_eq!(
        record(&pool, "Leeds", "Everton").await.status,
        RecordStatus::PostAnalysisSkippedNoLink
    );
    assert_eq!(
        record(&pool, "Fulham", "Brentford").await.status,
        RecordStatus::PostAnalysisSkippedNoPredictions
    );
    assert_eq!(
        record(&pool, "Arsenal", "Chelsea").await.status,
        RecordStatus::PostAnalysisFetchFailed
    );
}

#[tokio::test]
async fn tc_batch_014_post_match_failure_keeps_the_analysed_document() {
    // Given: a predicted record whose post-match reply is not JSON
    let (_dir, pool, post_config) = setup(TaskKind::PostMatch).await;
    let mut predicted =
        WorkItemRecord::new(&fixture("Arsenal", "Chelsea"), RecordStatus::AnalysisComplete);
    predicted.predict_status = true;
    predicted.predictions = Some(json!({"events": [{"minute": 30}]}));
    store(&pool).insert(&predicted).await.unwrap();

    let ai = ScriptedAi::new();
    ai.push_final(Reply::stop("The match was exciting."));
    let source = Arc::new(
        FakeMatchSource::new().with_document("https://stats.test/arsenal", "Final score 2-1"),
    );
    let orchestrator = build_orchestrator(&pool, &ai, source, test_clock());

    // When
    let summary = orchestrator
        .run_post_match_batch("14-06-2025", &post_config, &CancellationToken::new())
        .await
        .unwrap();

    // Then: the stored document is the whole input, predictions included
    assert_eq!(summary.failed, 1);
    let stored = record(&pool, "Arsenal", "Chelsea").await;
    assert_eq!(stored.status, RecordStatus::PostAnalysisFailed);
    assert!(!stored.post_match_status);
    let document = stored.markdown_content.expect("failed run keeps its input");
    assert!(document.starts_with("PRE-MATCH PREDICTIONS:
"));
    assert!(document.contains("\"minute\": 30"));
    assert!(document.ends_with("POST-MATCH STATS:

Final score 2-1"));
    assert_eq!(stored.error_details.unwrap()["analysis_outcome"], "malformed_json");
}
