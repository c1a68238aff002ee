//! Prediction record store
//!
//! [`PredictionStore`] is the document store contract the batch orchestrator
//! writes through. [`SqlitePredictionStore`] keeps one row per
//! `(match_date, home_team, away_team)` in the `predictions` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use matchday_common::{Error, Result};

use crate::models::{
    FindOptions, MatchKey, RecordFilter, RecordPatch, RecordStatus, WorkItemRecord,
};
use crate::utils::retry_on_lock;

const COLUMNS: &str = "id, match_date, home_team, away_team, competition, kickoff_time, \
    stats_link, status, predict_status, predictions, post_match_status, post_match_analysis, \
    markdown_content, error_details, created_at, updated_at";

/// Document store for work item records
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// First record matching `filter` in id order
    async fn find_one(&self, filter: &RecordFilter) -> Result<Option<WorkItemRecord>>;

    async fn find_many(
        &self,
        filter: &RecordFilter,
        options: &FindOptions,
    ) -> Result<Vec<WorkItemRecord>>;

    /// Insert a new record and return its id
    async fn insert(&self, record: &WorkItemRecord) -> Result<i64>;

    /// Apply `patch` to record `id`; false when no such record exists
    async fn update_by_id(&self, id: i64, patch: &RecordPatch) -> Result<bool>;

    async fn find_by_key(&self, key: &MatchKey) -> Result<Option<WorkItemRecord>> {
        self.find_one(&RecordFilter::by_key(key)).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<WorkItemRecord>> {
        self.find_one(&RecordFilter::by_id(id)).await
    }
}

/// SQLite-backed [`PredictionStore`]
#[derive(Debug, Clone)]
pub struct SqlitePredictionStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqlitePredictionStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    /// Build a store using the lock wait configured in the settings table
    pub async fn from_settings(pool: SqlitePool) -> Result<Self> {
        let max_lock_wait_ms = crate::db::settings::get_max_lock_wait_ms(&pool).await?;
        Ok(Self::new(pool, max_lock_wait_ms))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PredictionStore for SqlitePredictionStore {
    async fn find_one(&self, filter: &RecordFilter) -> Result<Option<WorkItemRecord>> {
        let options = FindOptions {
            limit: Some(1),
            ..Default::default()
        };
        Ok(self.find_many(filter, &options).await?.into_iter().next())
    }

    async fn find_many(
        &self,
        filter: &RecordFilter,
        options: &FindOptions,
    ) -> Result<Vec<WorkItemRecord>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM predictions", COLUMNS));
        push_filter(&mut builder, filter);

        builder.push(" ORDER BY ");
        builder.push(options.sort.column());
        builder.push(if options.descending { " DESC" } else { " ASC" });
        if options.sort != crate::models::SortField::Id {
            builder.push(", id ASC");
        }

        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded
        if options.limit.is_some() || options.skip.is_some() {
            builder.push(" LIMIT ");
            builder.push_bind(options.limit.unwrap_or(-1));
            if let Some(skip) = options.skip {
                builder.push(" OFFSET ");
                builder.push_bind(skip);
            }
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn insert(&self, record: &WorkItemRecord) -> Result<i64> {
        let status = record.status.as_str();
        let predictions = json_text(record.predictions.as_ref())?;
        let post_match_analysis = json_text(record.post_match_analysis.as_ref())?;
        let error_details = json_text(record.error_details.as_ref())?;
        let created_at = record.created_at.to_rfc3339();
        let updated_at = record.updated_at.to_rfc3339();
        let pool = &self.pool;

        retry_on_lock("insert_prediction", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                r#"
                INSERT INTO predictions (
                    match_date, home_team, away_team, competition, kickoff_time,
                    stats_link, status, predict_status, predictions, post_match_status,
                    post_match_analysis, markdown_content, error_details, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.key.date)
            .bind(&record.key.home_team)
            .bind(&record.key.away_team)
            .bind(&record.competition)
            .bind(&record.kickoff_time)
            .bind(&record.stats_link)
            .bind(status)
            .bind(record.predict_status)
            .bind(&predictions)
            .bind(record.post_match_status)
            .bind(&post_match_analysis)
            .bind(&record.markdown_content)
            .bind(&error_details)
            .bind(&created_at)
            .bind(&updated_at)
            .execute(pool)
            .await
            .map_err(Error::Database)?;

            Ok(result.last_insert_rowid())
        })
        .await
    }

    async fn update_by_id(&self, id: i64, patch: &RecordPatch) -> Result<bool> {
        let predictions = patch
            .predictions
            .as_ref()
            .map(|v| json_text(v.as_ref()))
            .transpose()?;
        let post_match_analysis = patch
            .post_match_analysis
            .as_ref()
            .map(|v| json_text(v.as_ref()))
            .transpose()?;
        let error_details = patch
            .error_details
            .as_ref()
            .map(|v| json_text(v.as_ref()))
            .transpose()?;
        let pool = &self.pool;

        retry_on_lock("update_prediction", self.max_lock_wait_ms, || async {
            let mut builder = QueryBuilder::<Sqlite>::new("UPDATE predictions SET ");
            let mut set = builder.separated(", ");

            set.push("updated_at = ");
            set.push_bind_unseparated(matchday_common::time::now().to_rfc3339());
            if let Some(v) = &patch.competition {
                set.push("competition = ");
                set.push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.kickoff_time {
                set.push("kickoff_time = ");
                set.push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.stats_link {
                set.push("stats_link = ");
                set.push_bind_unseparated(v.clone());
            }
            if let Some(v) = patch.status {
                set.push("status = ");
                set.push_bind_unseparated(v.as_str());
            }
            if let Some(v) = patch.predict_status {
                set.push("predict_status = ");
                set.push_bind_unseparated(v);
            }
            if let Some(v) = &predictions {
                set.push("predictions = ");
                set.push_bind_unseparated(v.clone());
            }
            if let Some(v) = patch.post_match_status {
                set.push("post_match_status = ");
                set.push_bind_unseparated(v);
            }
            if let Some(v) = &post_match_analysis {
                set.push("post_match_analysis = ");
                set.push_bind_unseparated(v.clone());
            }
            if let Some(v) = &patch.markdown_content {
                set.push("markdown_content = ");
                set.push_bind_unseparated(v.clone());
            }
            if let Some(v) = &error_details {
                set.push("error_details = ");
                set.push_bind_unseparated(v.clone());
            }

            builder.push(" WHERE id = ");
            builder.push_bind(id);

            let result = builder.build().execute(pool).await.map_err(Error::Database)?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }
}

fn push_condition(builder: &mut QueryBuilder<'_, Sqlite>, has_where: &mut bool, column: &str) {
    builder.push(if *has_where { " AND " } else { " WHERE " });
    builder.push(column);
    builder.push(" = ");
    *has_where = true;
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &RecordFilter) {
    let mut has_where = false;

    if let Some(id) = filter.id {
        push_condition(builder, &mut has_where, "id");
        builder.push_bind(id);
    }
    if let Some(date) = &filter.date {
        push_condition(builder, &mut has_where, "match_date");
        builder.push_bind(date.clone());
    }
    if let Some(home) = &filter.home_team {
        push_condition(builder, &mut has_where, "home_team");
        builder.push_bind(home.clone());
    }
    if let Some(away) = &filter.away_team {
        push_condition(builder, &mut has_where, "away_team");
        builder.push_bind(away.clone());
    }
    if let Some(status) = filter.status {
        push_condition(builder, &mut has_where, "status");
        builder.push_bind(status.as_str());
    }
    if let Some(predict_status) = filter.predict_status {
        push_condition(builder, &mut has_where, "predict_status");
        builder.push_bind(predict_status);
    }
    if let Some(post_match_status) = filter.post_match_status {
        push_condition(builder, &mut has_where, "post_match_status");
        builder.push_bind(post_match_status);
    }
}

fn json_text(value: Option<&Value>) -> Result<Option<String>> {
    value
        .map(|v| {
            serde_json::to_string(v)
                .map_err(|e| Error::Internal(format!("Failed to serialize JSON column: {}", e)))
        })
        .transpose()
}

fn json_column(row: &SqliteRow, column: &str) -> Result<Option<Value>> {
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| {
        serde_json::from_str(&t).map_err(|e| {
            Error::Internal(format!("Failed to deserialize {}: {}", column, e))
        })
    })
    .transpose()
}

fn timestamp_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let text: String = row.try_get(column)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn row_to_record(row: &SqliteRow) -> Result<WorkItemRecord> {
    let status: String = row.try_get("status")?;
    let status = status.parse::<RecordStatus>().map_err(Error::Internal)?;

    Ok(WorkItemRecord {
        id: Some(row.try_get("id")?),
        key: MatchKey {
            date: row.try_get("match_date")?,
            home_team: row.try_get("home_team")?,
            away_team: row.try_get("away_team")?,
        },
        competition: row.try_get("competition")?,
        kickoff_time: row.try_get("kickoff_time")?,
        stats_link: row.try_get("stats_link")?,
        status,
        predict_status: row.try_get("predict_status")?,
        predictions: json_column(row, "predictions")?,
        post_match_status: row.try_get("post_match_status")?,
        post_match_analysis: json_column(row, "post_match_analysis")?,
        markdown_content: row.try_get("markdown_content")?,
        error_details: json_column(row, "error_details")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}
