//! Competition filter operations
//!
//! Fixtures are only analysed when their competition is listed here and
//! active. An empty table means no fixtures are selected.

use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::collections::BTreeSet;

use matchday_common::{Error, Result};

/// One row of the competitions table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Competition {
    pub name: String,
    pub active: bool,
}

/// Add a competition (or reactivate an existing one)
pub async fn add_competition(db: &Pool<Sqlite>, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("Competition name must not be blank".to_string()));
    }

    sqlx::query(
        "INSERT INTO competitions (name, active) VALUES (?, 1)
         ON CONFLICT(name) DO UPDATE SET active = 1"
    )
    .bind(name)
    .execute(db)
    .await?;

    tracing::info!(competition = name, "Competition activated");
    Ok(())
}

/// Enable or disable a competition without removing it
pub async fn set_competition_active(db: &Pool<Sqlite>, name: &str, active: bool) -> Result<bool> {
    let result = sqlx::query("UPDATE competitions SET active = ? WHERE name = ?")
        .bind(active)
        .bind(name.trim())
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Remove a competition; returns false when it was not listed
pub async fn remove_competition(db: &Pool<Sqlite>, name: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM competitions WHERE name = ?")
        .bind(name.trim())
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_competitions(db: &Pool<Sqlite>) -> Result<Vec<Competition>> {
    let rows = sqlx::query_as::<_, Competition>(
        "SELECT name, active FROM competitions ORDER BY name"
    )
    .fetch_all(db)
    .await?;

    Ok(rows)
}

/// Names of the active competitions (the fixture filter set)
pub async fn active_competitions(db: &Pool<Sqlite>) -> Result<BTreeSet<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM competitions WHERE active = 1"
    )
    .fetch_all(db)
    .await?;

    Ok(names.into_iter().collect())
}
