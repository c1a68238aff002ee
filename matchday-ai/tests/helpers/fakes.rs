//! Scripted collaborators
//!
//! `ScriptedAi` answers every turn from a script and records what was sent;
//! `FakeMatchSource` serves fixtures and documents from memory.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use matchday_ai::db::SqlitePredictionStore;
use matchday_ai::error::AnalysisError;
use matchday_ai::models::WorkItemContext;
use matchday_ai::services::{
    AiService, AiSession, BatchOrchestrator, ChunkedConversation, GenerationDirective,
    MatchSource, RateGate, TurnResponse,
};
use matchday_common::time::{format_match_date, Clock, ManualClock};

/// Scripted answer to one turn
#[derive(Debug, Clone)]
pub enum Reply {
    /// Candidate text with an optional completion reason
    Text { text: String, finish: Option<String> },
    /// Prompt-level block
    Blocked(String),
    /// HTTP 429 from the service
    RateLimited,
    /// Unblocked reply that carried no candidate
    NoCandidate,
    /// Never answers (exercises the turn timeout)
    Hang,
}

impl Reply {
    pub fn stop(text: &str) -> Self {
        Reply::Text {
            text: text.to_string(),
            finish: Some("STOP".to_string()),
        }
    }

    pub fn finish(text: &str, reason: &str) -> Self {
        Reply::Text {
            text: text.to_string(),
            finish: Some(reason.to_string()),
        }
    }
}

/// One message received by a scripted session
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// 1-based session number
    pub session: usize,
    /// 0-based turn number within the session
    pub turn: usize,
    pub text: String,
    pub directive: Option<GenerationDirective>,
}

#[derive(Default)]
struct ScriptState {
    sessions_opened: usize,
    models: Vec<String>,
    sent: Vec<SentMessage>,
    final_replies: VecDeque<Reply>,
    turn_overrides: HashMap<(usize, usize), Reply>,
}

/// AI service fake driven by a script
#[derive(Clone, Default)]
pub struct ScriptedAi {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedAi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the reply to the next final (directive-carrying) turn.
    /// Without a queued reply the final turn returns `{"events": []}`.
    pub fn push_final(&self, reply: Reply) -> &Self {
        self.state.lock().unwrap().final_replies.push_back(reply);
        self
    }

    /// Reply to turn `turn` of session `session` (both as in [`SentMessage`])
    pub fn override_turn(&self, session: usize, turn: usize, reply: Reply) -> &Self {
        self.state
            .lock()
            .unwrap()
            .turn_overrides
            .insert((session, turn), reply);
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().unwrap().sessions_opened
    }

    pub fn models(&self) -> Vec<String> {
        self.state.lock().unwrap().models.clone()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_in_session(&self, session: usize) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.session == session)
            .collect()
    }
}

impl AiService for ScriptedAi {
    fn create_session(&self, model_id: &str) -> Box<dyn AiSession> {
        let mut state = self.state.lock().unwrap();
        state.sessions_opened += 1;
        state.models.push(model_id.to_string());
        Box::new(ScriptedSession {
            state: self.state.clone(),
            session: state.sessions_opened,
            turn: 0,
        })
    }
}

struct ScriptedSession {
    state: Arc<Mutex<ScriptState>>,
    session: usize,
    turn: usize,
}

#[async_trait]
impl AiSession for ScriptedSession {
    async fn send(
        &mut self,
        message: &str,
        directive: Option<&GenerationDirective>,
    ) -> Result<TurnResponse, AnalysisError> {
        let reply = {
            let mut state = self.state.lock().unwrap();
            state.sent.push(SentMessage {
                session: self.session,
                turn: self.turn,
                text: message.to_string(),
                directive: directive.cloned(),
            });

            match state.turn_overrides.get(&(self.session, self.turn)).cloned() {
                Some(reply) => reply,
                None if directive.is_some() => state
                    .final_replies
                    .pop_front()
                    .unwrap_or_else(|| Reply::stop(r#"{"events": []}"#)),
                None => Reply::stop("Acknowledged"),
            }
        };
        self.turn += 1;

        match reply {
            Reply::Text { text, finish } => Ok(TurnResponse {
                text: Some(text),
                finish_reason: finish,
                block_reason: None,
            }),
            Reply::Blocked(reason) => Ok(TurnResponse {
                text: None,
                finish_reason: None,
                block_reason: Some(reason),
            }),
            Reply::RateLimited => Err(AnalysisError::Transport {
                detail: "429 Too Many Requests: RESOURCE_EXHAUSTED".to_string(),
                rate_limited: true,
            }),
            Reply::NoCandidate => Err(AnalysisError::Decode(
                "Gemini response contained no candidate".to_string(),
            )),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(TurnResponse::default())
            }
        }
    }
}

/// Match source fake serving fixtures and documents from memory
#[derive(Default)]
pub struct FakeMatchSource {
    fixtures: Vec<WorkItemContext>,
    documents: HashMap<String, String>,
    requested_dates: Mutex<Vec<NaiveDate>>,
    fetched_links: Mutex<Vec<String>>,
}

impl FakeMatchSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixture(mut self, item: WorkItemContext) -> Self {
        self.fixtures.push(item);
        self
    }

    pub fn with_document(mut self, link: &str, document: &str) -> Self {
        self.documents.insert(link.to_string(), document.to_string());
        self
    }

    pub fn fetched_links(&self) -> Vec<String> {
        self.fetched_links.lock().unwrap().clone()
    }

    pub fn requested_dates(&self) -> Vec<NaiveDate> {
        self.requested_dates.lock().unwrap().clone()
    }
}

#[async_trait]
impl MatchSource for FakeMatchSource {
    async fn fetch_work_items(
        &self,
        _source_url: &str,
        active: &BTreeSet<String>,
        target_date: NaiveDate,
    ) -> Result<Vec<WorkItemContext>, AnalysisError> {
        self.requested_dates.lock().unwrap().push(target_date);
        Ok(self
            .fixtures
            .iter()
            .filter(|f| active.contains(&f.competition))
            .cloned()
            .map(|mut f| {
                f.date = format_match_date(target_date);
                f
            })
            .collect())
    }

    async fn fetch_input_document(&self, link: &str) -> Option<String> {
        self.fetched_links.lock().unwrap().push(link.to_string());
        self.documents.get(link).cloned()
    }
}

/// Manual clock at 2025-06-14 12:00 local time
pub fn test_clock() -> Arc<ManualClock> {
    let start: DateTime<Local> = Local.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap();
    Arc::new(ManualClock::new(start))
}

/// Fixture with a stats link derived from the home team
pub fn fixture(home: &str, away: &str) -> WorkItemContext {
    WorkItemContext {
        competition: "Premier League".to_string(),
        date: "14-06-2025".to_string(),
        time: "15:00".to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        stats_link: Some(format!("https://stats.test/{}", home.to_lowercase())),
    }
}

/// Orchestrator over a real SQLite store and the given fakes
pub fn build_orchestrator(
    pool: &SqlitePool,
    ai: &ScriptedAi,
    source: Arc<FakeMatchSource>,
    clock: Arc<ManualClock>,
) -> BatchOrchestrator {
    let clock: Arc<dyn Clock> = clock;
    let gate = Arc::new(RateGate::new(clock.clone()));
    let conversation =
        ChunkedConversation::new(Arc::new(ai.clone()), gate, Duration::from_secs(5));
    let store = SqlitePredictionStore::new(pool.clone(), 1000);
    BatchOrchestrator::new(Arc::new(store), source, conversation, clock)
}
