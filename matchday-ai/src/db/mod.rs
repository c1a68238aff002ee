//! Database access for matchday-ai
//!
//! Opens the shared `matchday.db`, creates the service tables and seeds the
//! default analysis settings.

pub mod competitions;
pub mod predictions;
pub mod settings;

pub use predictions::{PredictionStore, SqlitePredictionStore};

use sqlx::SqlitePool;
use std::path::Path;

use matchday_common::Result;

/// Open the database at `db_path` and prepare every matchday-ai table
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = matchday_common::db::init_database(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tables (idempotent) and seed default settings
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    matchday_common::db::create_settings_table(pool).await?;
    create_competitions_table(pool).await?;
    create_predictions_table(pool).await?;
    settings::seed_default_settings(pool).await?;
    Ok(())
}

pub async fn create_competitions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS competitions (
            name TEXT PRIMARY KEY,
            active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_predictions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_date TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            competition TEXT NOT NULL DEFAULT '',
            kickoff_time TEXT NOT NULL DEFAULT '',
            stats_link TEXT,
            status TEXT NOT NULL,
            predict_status INTEGER NOT NULL DEFAULT 0,
            predictions TEXT,
            post_match_status INTEGER NOT NULL DEFAULT 0,
            post_match_analysis TEXT,
            markdown_content TEXT,
            error_details TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (match_date, home_team, away_team)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_predictions_date_status
         ON predictions (match_date, predict_status, post_match_status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
