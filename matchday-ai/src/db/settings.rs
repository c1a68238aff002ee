//! Settings database operations
//!
//! The settings table is the flat key/value configuration source of the
//! analysis pipeline. Numeric knobs are seeded with defaults on startup;
//! prompts, schemas and fixture URLs must be provided by the operator.

use sqlx::{Pool, Sqlite};
use std::collections::HashMap;

use matchday_common::{Error, Result};

pub const KEY_TODAY_FIXTURE_URL: &str = "today_fixture_url";
pub const KEY_TOMORROW_FIXTURE_URL: &str = "tomorrow_fixture_url";
pub const KEY_FETCH_TODAY: &str = "fetch_today";
pub const KEY_NUMBER_OF_PREDICTED_EVENTS: &str = "number_of_predicted_events";
pub const KEY_CHUNK_SIZE_CHARS: &str = "chunk_size_chars";
pub const KEY_MODEL: &str = "model";
pub const KEY_MAX_OUTPUT_TOKENS: &str = "max_output_tokens";
pub const KEY_TEMPERATURE: &str = "temperature";
pub const KEY_TOP_P: &str = "top_p";
pub const KEY_TOP_K: &str = "top_k";
pub const KEY_RPM: &str = "rpm";
pub const KEY_RPD: &str = "rpd";
pub const KEY_DELAY_BETWEEN_MATCHES: &str = "delay_between_matches";
pub const KEY_GEMINI_API_KEY: &str = "gemini_api_key";
pub const KEY_DATABASE_MAX_LOCK_WAIT_MS: &str = "database_max_lock_wait_ms";

/// Values written by [`seed_default_settings`]
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    (KEY_FETCH_TODAY, "true"),
    (KEY_NUMBER_OF_PREDICTED_EVENTS, "10"),
    (KEY_CHUNK_SIZE_CHARS, "100000"),
    (KEY_MODEL, "gemini-2.0-flash"),
    (KEY_MAX_OUTPUT_TOKENS, "8192"),
    (KEY_TEMPERATURE, "0.0"),
    (KEY_TOP_P, "0.9"),
    (KEY_RPM, "30"),
    (KEY_RPD, "1500"),
    (KEY_DELAY_BETWEEN_MATCHES, "15"),
    (KEY_DATABASE_MAX_LOCK_WAIT_MS, "5000"),
];

/// Insert defaults for every seeded key that has no value yet
pub async fn seed_default_settings(db: &Pool<Sqlite>) -> Result<()> {
    for (key, value) in DEFAULT_SETTINGS {
        matchday_common::db::ensure_setting(db, key, value).await?;
    }
    Ok(())
}

/// Get Gemini API key from database
///
/// **Returns:** Some(key) if set and non-blank, None otherwise
pub async fn get_gemini_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    Ok(get_setting::<String>(db, KEY_GEMINI_API_KEY)
        .await?
        .filter(|key| !key.trim().is_empty()))
}

/// Set Gemini API key in database
pub async fn set_gemini_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, KEY_GEMINI_API_KEY, key).await
}

/// Max total retry time for store writes
///
/// **Default:** 5000 ms
pub async fn get_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, KEY_DATABASE_MAX_LOCK_WAIT_MS)
        .await
        .map(|opt| opt.unwrap_or(crate::utils::db_retry::DEFAULT_MAX_LOCK_WAIT_MS))
}

/// Generic setting getter
///
/// A NULL value reads as `None`.
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as(
        "SELECT value FROM settings WHERE key = ?"
    )
    .bind(key)
    .fetch_optional(db)
    .await
    .map_err(Error::Database)?;

    match row {
        Some((Some(value),)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Generic setting setter (insert or overwrite)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP"
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Remove a setting; returns false when it did not exist
pub async fn delete_setting(db: &Pool<Sqlite>, key: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(db)
        .await
        .map_err(Error::Database)?;

    Ok(result.rows_affected() > 0)
}

/// All non-NULL settings, ordered by key
pub async fn list_settings(db: &Pool<Sqlite>) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT key, value FROM settings WHERE value IS NOT NULL ORDER BY key"
    )
    .fetch_all(db)
    .await
    .map_err(Error::Database)?;

    Ok(rows)
}

/// Snapshot of the settings table used to build a typed configuration
pub async fn load_settings_map(db: &Pool<Sqlite>) -> Result<HashMap<String, String>> {
    Ok(list_settings(db).await?.into_iter().collect())
}
