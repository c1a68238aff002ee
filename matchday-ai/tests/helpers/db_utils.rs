//! Database Test Utilities
//!
//! Temporary databases with the matchday-ai schema and analysis settings

use anyhow::Result;
use sqlx::SqlitePool;
use tempfile::TempDir;

use matchday_ai::db::settings::set_setting;
use matchday_ai::models::TaskKind;

/// Column information from PRAGMA table_info
#[derive(Debug, sqlx::FromRow)]
pub struct ColumnInfo {
    pub cid: i32,
    pub name: String,
    pub r#type: String,
    pub notnull: i32,
    pub dflt_value: Option<String>,
    pub pk: i32,
}

/// Create temporary test database with every table initialized
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_matchday.db");
    let pool = matchday_ai::db::init_database_pool(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Store prompts, schema and fixture URLs needed by `kind`
pub async fn seed_analysis_settings(pool: &SqlitePool, kind: TaskKind) -> Result<()> {
    let schema = r#"{"type": "object", "properties": {"events": {"type": "array"}}}"#;
    match kind {
        TaskKind::PreMatch => {
            set_setting(
                pool,
                "predict_initial_prompt",
                "Predict {number_of_predicted_events} events for {home_team} vs {away_team}",
            )
            .await?;
            set_setting(pool, "predict_final_prompt", "Return the predictions as JSON").await?;
            set_setting(pool, "match_prediction_schema", schema).await?;
            set_setting(pool, "today_fixture_url", "https://fixtures.test/today").await?;
            set_setting(pool, "tomorrow_fixture_url", "https://fixtures.test/tomorrow").await?;
        }
        TaskKind::PostMatch => {
            set_setting(
                pool,
                "post_match_initial_prompt",
                "Review predictions for {home_team} vs {away_team}",
            )
            .await?;
            set_setting(pool, "post_match_final_prompt", "Return the review as JSON").await?;
            set_setting(pool, "post_match_analysis_schema", schema).await?;
        }
    }
    Ok(())
}

/// Get table schema information
pub async fn get_table_columns(pool: &SqlitePool, table_name: &str) -> Result<Vec<ColumnInfo>> {
    let query = format!("PRAGMA table_info({})", table_name);
    let columns = sqlx::query_as::<_, ColumnInfo>(&query)
        .fetch_all(pool)
        .await?;
    Ok(columns)
}

/// Check if table has specific column
pub async fn has_column(pool: &SqlitePool, table_name: &str, column_name: &str) -> Result<bool> {
    let columns = get_table_columns(pool, table_name).await?;
    Ok(columns.iter().any(|c| c.name == column_name))
}
