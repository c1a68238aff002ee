//! Match source
//!
//! Narrow adapter over the fixtures feed and the per-match statistics pages.
//! [`HttpMatchSource`] reads a JSON fixtures feed and fetches the statistics
//! document for each fixture as text.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{header, Client};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use matchday_common::time::format_match_date;

use crate::error::AnalysisError;
use crate::models::WorkItemContext;

/// Default timeout for fixture and statistics requests
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("matchday-ai/", env!("CARGO_PKG_VERSION"));

/// Source of work items and their input documents
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// Fixtures at `source_url` whose competition is in `active`, stamped with `target_date`
    async fn fetch_work_items(
        &self,
        source_url: &str,
        active: &BTreeSet<String>,
        target_date: NaiveDate,
    ) -> Result<Vec<WorkItemContext>, AnalysisError>;

    /// Statistics document behind `link`; `None` on any failure or blank body
    async fn fetch_input_document(&self, link: &str) -> Option<String>;
}

/// One entry of the fixtures feed
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureEntry {
    pub competition: String,
    #[serde(default)]
    pub time: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub stats_link: Option<String>,
}

/// Keep fixtures of active competitions and stamp the match date
pub fn select_fixtures(
    entries: Vec<FixtureEntry>,
    active: &BTreeSet<String>,
    target_date: NaiveDate,
) -> Vec<WorkItemContext> {
    let date = format_match_date(target_date);

    entries
        .into_iter()
        .filter(|entry| active.contains(entry.competition.trim()))
        .filter(|entry| {
            let complete = !entry.home_team.trim().is_empty() && !entry.away_team.trim().is_empty();
            if !complete {
                warn!(competition = %entry.competition, "Skipping fixture without team names");
            }
            complete
        })
        .map(|entry| WorkItemContext {
            competition: entry.competition.trim().to_string(),
            date: date.clone(),
            time: entry.time.trim().to_string(),
            home_team: entry.home_team.trim().to_string(),
            away_team: entry.away_team.trim().to_string(),
            stats_link: entry
                .stats_link
                .map(|link| link.trim().to_string())
                .filter(|link| !link.is_empty()),
        })
        .collect()
}

/// HTTP-backed [`MatchSource`]
#[derive(Debug, Clone)]
pub struct HttpMatchSource {
    http_client: Client,
    timeout: Duration,
}

impl HttpMatchSource {
    pub fn new(timeout: Duration) -> Result<Self, AnalysisError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

        let http_client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| AnalysisError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            timeout,
        })
    }
}

#[async_trait]
impl MatchSource for HttpMatchSource {
    async fn fetch_work_items(
        &self,
        source_url: &str,
        active: &BTreeSet<String>,
        target_date: NaiveDate,
    ) -> Result<Vec<WorkItemContext>, AnalysisError> {
        if active.is_empty() {
            info!("No active competitions configured, no fixtures selected");
            return Ok(Vec::new());
        }

        debug!(url = %source_url, "Fetching fixtures");
        let response = self
            .http_client
            .get(source_url)
            .send()
            .await
            .map_err(|e| AnalysisError::from_reqwest(e, self.timeout.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let entries: Vec<FixtureEntry> = response
            .json()
            .await
            .map_err(|e| AnalysisError::Decode(format!("Failed to parse fixtures feed: {}", e)))?;
        let listed = entries.len();

        let items = select_fixtures(entries, active, target_date);
        info!(
            listed,
            selected = items.len(),
            date = %format_match_date(target_date),
            "Fixtures loaded"
        );
        Ok(items)
    }

    async fn fetch_input_document(&self, link: &str) -> Option<String> {
        let response = match self.http_client.get(link).send().await {
            Ok(response) => response,
            Err(e) => {
                let err = AnalysisError::from_reqwest(e, self.timeout.as_secs());
                warn!(link, error = %err, "Statistics fetch failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(link, status = status.as_u16(), "Statistics fetch returned error status");
            return None;
        }

        match response.text().await {
            Ok(body) if !body.trim().is_empty() => Some(body),
            Ok(_) => {
                warn!(link, "Statistics document is empty");
                None
            }
            Err(e) => {
                warn!(link, error = %e, "Failed to read statistics document");
                None
            }
        }
    }
}
