//! Work items and their persisted records
//!
//! A work item is one fixture. Its identity is `(date, home_team, away_team)`
//! and at most one [`WorkItemRecord`] exists per identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One fixture to analyse, as produced by the match source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemContext {
    pub competition: String,
    /// Match date, `DD-MM-YYYY`
    pub date: String,
    /// Kick-off time as listed by the source
    pub time: String,
    pub home_team: String,
    pub away_team: String,
    /// Link to the statistics document, if the source offered one
    pub stats_link: Option<String>,
}

impl WorkItemContext {
    pub fn key(&self) -> MatchKey {
        MatchKey {
            date: self.date.clone(),
            home_team: self.home_team.clone(),
            away_team: self.away_team.clone(),
        }
    }

    /// Fields available to prompt templates
    pub fn template_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("competition".to_string(), self.competition.clone());
        fields.insert("date".to_string(), self.date.clone());
        fields.insert("time".to_string(), self.time.clone());
        fields.insert("home_team".to_string(), self.home_team.clone());
        fields.insert("away_team".to_string(), self.away_team.clone());
        fields
    }
}

/// Identity key of a work item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchKey {
    pub date: String,
    pub home_team: String,
    pub away_team: String,
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {} ({})", self.home_team, self.away_team, self.date)
    }
}

/// Processing status persisted on each record
///
/// Pre-match statuses come first, post-match statuses carry the
/// `post_analysis_` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    PendingAnalysis,
    FetchFailed,
    AnalysisFailed,
    AnalysisComplete,
    PostAnalysisSkippedNoLink,
    PostAnalysisSkippedNoPredictions,
    PostAnalysisFetchFailed,
    PostAnalysisFailed,
    PostAnalysisComplete,
}

impl RecordStatus {
    pub const ALL: [RecordStatus; 9] = [
        RecordStatus::PendingAnalysis,
        RecordStatus::FetchFailed,
        RecordStatus::AnalysisFailed,
        RecordStatus::AnalysisComplete,
        RecordStatus::PostAnalysisSkippedNoLink,
        RecordStatus::PostAnalysisSkippedNoPredictions,
        RecordStatus::PostAnalysisFetchFailed,
        RecordStatus::PostAnalysisFailed,
        RecordStatus::PostAnalysisComplete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::PendingAnalysis => "pending_analysis",
            RecordStatus::FetchFailed => "fetch_failed",
            RecordStatus::AnalysisFailed => "analysis_failed",
            RecordStatus::AnalysisComplete => "analysis_complete",
            RecordStatus::PostAnalysisSkippedNoLink => "post_analysis_skipped_no_link",
            RecordStatus::PostAnalysisSkippedNoPredictions => {
                "post_analysis_skipped_no_predictions"
            }
            RecordStatus::PostAnalysisFetchFailed => "post_analysis_fetch_failed",
            RecordStatus::PostAnalysisFailed => "post_analysis_failed",
            RecordStatus::PostAnalysisComplete => "post_analysis_complete",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown record status: {}", s))
    }
}

/// Persisted state of one work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemRecord {
    /// Store-assigned id (`None` until inserted)
    pub id: Option<i64>,
    pub key: MatchKey,
    pub competition: String,
    pub kickoff_time: String,
    pub stats_link: Option<String>,
    pub status: RecordStatus,
    /// True once a pre-match prediction has been stored
    pub predict_status: bool,
    pub predictions: Option<Value>,
    /// True once a post-match analysis has been stored
    pub post_match_status: bool,
    pub post_match_analysis: Option<Value>,
    /// Input document kept after a failed analysis
    pub markdown_content: Option<String>,
    pub error_details: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItemRecord {
    /// Fresh, not yet inserted record for `context`
    pub fn new(context: &WorkItemContext, status: RecordStatus) -> Self {
        let now = matchday_common::time::now();
        Self {
            id: None,
            key: context.key(),
            competition: context.competition.clone(),
            kickoff_time: context.time.clone(),
            stats_link: context.stats_link.clone(),
            status,
            predict_status: false,
            predictions: None,
            post_match_status: false,
            post_match_analysis: None,
            markdown_content: None,
            error_details: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild the work item this record was created from
    pub fn context(&self) -> WorkItemContext {
        WorkItemContext {
            competition: self.competition.clone(),
            date: self.key.date.clone(),
            time: self.kickoff_time.clone(),
            home_team: self.key.home_team.clone(),
            away_team: self.key.away_team.clone(),
            stats_link: self.stats_link.clone(),
        }
    }

    /// Apply a partial update in memory and bump `updated_at`
    pub fn apply(&mut self, patch: &RecordPatch) {
        if let Some(v) = &patch.competition {
            self.competition = v.clone();
        }
        if let Some(v) = &patch.kickoff_time {
            self.kickoff_time = v.clone();
        }
        if let Some(v) = &patch.stats_link {
            self.stats_link = v.clone();
        }
        if let Some(v) = patch.status {
            self.status = v;
        }
        if let Some(v) = patch.predict_status {
            self.predict_status = v;
        }
        if let Some(v) = &patch.predictions {
            self.predictions = v.clone();
        }
        if let Some(v) = patch.post_match_status {
            self.post_match_status = v;
        }
        if let Some(v) = &patch.post_match_analysis {
            self.post_match_analysis = v.clone();
        }
        if let Some(v) = &patch.markdown_content {
            self.markdown_content = v.clone();
        }
        if let Some(v) = &patch.error_details {
            self.error_details = v.clone();
        }
        self.updated_at = matchday_common::time::now();
    }
}

/// Partial update of a [`WorkItemRecord`]
///
/// `None` leaves a field untouched. For nullable fields `Some(None)` clears
/// the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub competition: Option<String>,
    pub kickoff_time: Option<String>,
    pub stats_link: Option<Option<String>>,
    pub status: Option<RecordStatus>,
    pub predict_status: Option<bool>,
    pub predictions: Option<Option<Value>>,
    pub post_match_status: Option<bool>,
    pub post_match_analysis: Option<Option<Value>>,
    pub markdown_content: Option<Option<String>>,
    pub error_details: Option<Option<Value>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        *self == RecordPatch::default()
    }
}

/// Equality filter for store lookups; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub id: Option<i64>,
    pub date: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub status: Option<RecordStatus>,
    pub predict_status: Option<bool>,
    pub post_match_status: Option<bool>,
}

impl RecordFilter {
    pub fn by_key(key: &MatchKey) -> Self {
        Self {
            date: Some(key.date.clone()),
            home_team: Some(key.home_team.clone()),
            away_team: Some(key.away_team.clone()),
            ..Default::default()
        }
    }

    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    /// True when `record` satisfies every set field
    pub fn matches(&self, record: &WorkItemRecord) -> bool {
        self.id.map_or(true, |id| record.id == Some(id))
            && self.date.as_ref().map_or(true, |d| &record.key.date == d)
            && self.home_team.as_ref().map_or(true, |h| &record.key.home_team == h)
            && self.away_team.as_ref().map_or(true, |a| &record.key.away_team == a)
            && self.status.map_or(true, |s| record.status == s)
            && self.predict_status.map_or(true, |p| record.predict_status == p)
            && self.post_match_status.map_or(true, |p| record.post_match_status == p)
    }
}

/// Column a `find_many` result is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Id,
    KickoffTime,
    UpdatedAt,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::KickoffTime => "kickoff_time",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

/// Paging and ordering for `find_many`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FindOptions {
    pub limit: Option<i64>,
    pub skip: Option<i64>,
    pub sort: SortField,
    pub descending: bool,
}
