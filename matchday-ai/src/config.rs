//! Configuration resolution for matchday-ai
//!
//! The settings table is read once per run into a typed [`AnalysisConfig`].
//! Validation collects every problem before failing, so the operator sees
//! all missing or invalid keys at once. The Gemini API key follows a
//! Database → ENV → TOML priority.

use serde_json::Value;
use sqlx::{Pool, Sqlite};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use matchday_common::config::TomlConfig;
use matchday_common::{Error, Result};

use crate::db::settings::{
    KEY_CHUNK_SIZE_CHARS, KEY_DELAY_BETWEEN_MATCHES, KEY_FETCH_TODAY, KEY_MAX_OUTPUT_TOKENS,
    KEY_MODEL, KEY_NUMBER_OF_PREDICTED_EVENTS, KEY_RPD, KEY_RPM, KEY_TEMPERATURE,
    KEY_TODAY_FIXTURE_URL, KEY_TOMORROW_FIXTURE_URL, KEY_TOP_K, KEY_TOP_P,
};
use crate::models::{ConversationTask, GenerationOptions, RateLimits, TaskKind};

/// Environment variable holding the Gemini API key
pub const GEMINI_API_KEY_ENV: &str = "MATCHDAY_GEMINI_API_KEY";

/// Pause between work items when `delay_between_matches` is not set
pub const DEFAULT_DELAY_BETWEEN_MATCHES: Duration = Duration::from_secs(15);

/// Validated analysis settings for one batch run
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub kind: TaskKind,
    pub initial_prompt: String,
    pub final_prompt: String,
    pub output_schema: Value,
    pub model: String,
    pub chunk_size_chars: usize,
    pub generation: GenerationOptions,
    pub number_of_predicted_events: Option<u32>,
    pub rate_limits: RateLimits,
    pub delay_between_matches: Duration,
    /// Pre-match only: analyse today's fixtures instead of tomorrow's
    pub fetch_today: bool,
    /// Pre-match only: fixtures feed for the selected day
    pub fixture_url: Option<String>,
}

impl AnalysisConfig {
    /// Read and validate the settings table for `kind`
    pub async fn load(db: &Pool<Sqlite>, kind: TaskKind) -> Result<Self> {
        let settings = crate::db::settings::load_settings_map(db).await?;
        Self::from_settings(kind, &settings)
    }

    /// Validate a settings snapshot
    ///
    /// Returns `Error::Config` naming every missing or invalid key.
    pub fn from_settings(kind: TaskKind, settings: &HashMap<String, String>) -> Result<Self> {
        let mut reader = SettingsReader {
            settings,
            problems: Vec::new(),
        };

        let initial_prompt = reader.required_text(kind.initial_prompt_key());
        let final_prompt = reader.required_text(kind.final_prompt_key());
        let output_schema = reader.required_schema(kind.schema_key());
        let model = reader.required_text(KEY_MODEL);

        let chunk_size_chars = reader.required::<i64>(KEY_CHUNK_SIZE_CHARS).and_then(|n| {
            if n > 0 {
                Some(n as usize)
            } else {
                reader.invalid(KEY_CHUNK_SIZE_CHARS, "must be greater than 0");
                None
            }
        });

        let generation = GenerationOptions {
            max_output_tokens: reader.positive_u32(KEY_MAX_OUTPUT_TOKENS),
            temperature: reader.bounded_f64(KEY_TEMPERATURE, 0.0, 2.0),
            top_p: reader.bounded_f64(KEY_TOP_P, 0.0, 1.0),
            top_k: reader.positive_u32(KEY_TOP_K),
        };
        let number_of_predicted_events = reader.positive_u32(KEY_NUMBER_OF_PREDICTED_EVENTS);

        let rate_limits = RateLimits {
            per_minute: reader.limit(KEY_RPM),
            per_day: reader.limit(KEY_RPD),
        };

        let delay_between_matches = match reader.optional::<f64>(KEY_DELAY_BETWEEN_MATCHES) {
            Some(secs) => match Duration::try_from_secs_f64(secs) {
                Ok(delay) => delay,
                Err(_) => {
                    reader.invalid(
                        KEY_DELAY_BETWEEN_MATCHES,
                        "must be a non-negative number of seconds within range",
                    );
                    DEFAULT_DELAY_BETWEEN_MATCHES
                }
            },
            None => DEFAULT_DELAY_BETWEEN_MATCHES,
        };

        let fetch_today = reader.optional::<bool>(KEY_FETCH_TODAY).unwrap_or(true);
        let fixture_url = match kind {
            TaskKind::PreMatch => {
                let key = if fetch_today {
                    KEY_TODAY_FIXTURE_URL
                } else {
                    KEY_TOMORROW_FIXTURE_URL
                };
                reader.required_text(key)
            }
            TaskKind::PostMatch => None,
        };

        if !reader.problems.is_empty() {
            return Err(Error::Config(format!(
                "Invalid {} configuration: {}",
                kind,
                reader.problems.join("; ")
            )));
        }

        // Every None below was recorded as a problem above
        match (initial_prompt, final_prompt, output_schema, model, chunk_size_chars) {
            (
                Some(initial_prompt),
                Some(final_prompt),
                Some(output_schema),
                Some(model),
                Some(chunk_size_chars),
            ) => Ok(Self {
                kind,
                initial_prompt,
                final_prompt,
                output_schema,
                model,
                chunk_size_chars,
                generation,
                number_of_predicted_events,
                rate_limits,
                delay_between_matches,
                fetch_today,
                fixture_url,
            }),
            _ => Err(Error::Config(format!("Invalid {} configuration", kind))),
        }
    }

    /// Build the conversation task for one work item
    pub fn build_task(
        &self,
        context: BTreeMap<String, String>,
        input_document: String,
    ) -> ConversationTask {
        ConversationTask {
            kind: self.kind,
            context,
            input_document,
            prompt_template: self.initial_prompt.clone(),
            final_instruction: self.final_prompt.clone(),
            output_schema: self.output_schema.clone(),
            model_id: self.model.clone(),
            chunk_size_chars: self.chunk_size_chars,
            generation: self.generation,
            requested_result_count: self.number_of_predicted_events,
            rate_limits: self.rate_limits,
        }
    }
}

/// Typed accessors over a settings snapshot that record every problem
struct SettingsReader<'a> {
    settings: &'a HashMap<String, String>,
    problems: Vec<String>,
}

impl SettingsReader<'_> {
    fn raw(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn missing(&mut self, key: &str) {
        self.problems.push(format!("'{}' is missing", key));
    }

    fn invalid(&mut self, key: &str, reason: &str) {
        self.problems.push(format!("'{}' {}", key, reason));
    }

    fn required_text(&mut self, key: &str) -> Option<String> {
        match self.raw(key) {
            Some(value) => Some(value.to_string()),
            None => {
                self.missing(key);
                None
            }
        }
    }

    fn optional<T: FromStr>(&mut self, key: &str) -> Option<T> {
        let raw = self.raw(key)?.to_string();
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                self.invalid(key, &format!("has unparsable value '{}'", raw));
                None
            }
        }
    }

    fn required<T: FromStr>(&mut self, key: &str) -> Option<T> {
        if self.raw(key).is_none() {
            self.missing(key);
            return None;
        }
        self.optional(key)
    }

    fn required_schema(&mut self, key: &str) -> Option<Value> {
        let raw = self.required_text(key)?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) if value.is_object() => Some(value),
            Ok(_) => {
                self.invalid(key, "must be a JSON object");
                None
            }
            Err(e) => {
                self.invalid(key, &format!("is not valid JSON ({})", e));
                None
            }
        }
    }

    /// Optional positive integer; zero or negative is invalid
    fn positive_u32(&mut self, key: &str) -> Option<u32> {
        let value = self.optional::<i64>(key)?;
        match u32::try_from(value) {
            Ok(v) if v > 0 => Some(v),
            _ => {
                self.invalid(key, "must be a positive integer");
                None
            }
        }
    }

    fn bounded_f64(&mut self, key: &str, min: f64, max: f64) -> Option<f64> {
        let value = self.optional::<f64>(key)?;
        if value >= min && value <= max {
            Some(value)
        } else {
            self.invalid(key, &format!("must be between {} and {}", min, max));
            None
        }
    }

    /// Request quota; zero or negative means unlimited
    fn limit(&mut self, key: &str) -> Option<u32> {
        let value = self.optional::<i64>(key)?;
        if value <= 0 {
            return None;
        }
        Some(u32::try_from(value).unwrap_or(u32::MAX))
    }
}

/// Resolve the Gemini API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_gemini_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<String> {
    let db_key = crate::db::settings::get_gemini_api_key(db).await?;
    let env_key = std::env::var(GEMINI_API_KEY_ENV).ok();
    select_api_key(db_key, env_key, toml_config.gemini_api_key.clone())
}

fn select_api_key(
    db_key: Option<String>,
    env_key: Option<String>,
    toml_key: Option<String>,
) -> Result<String> {
    let candidates = [
        ("database", db_key),
        ("environment", env_key),
        ("TOML", toml_key),
    ];

    let valid: Vec<(&str, String)> = candidates
        .into_iter()
        .filter_map(|(source, key)| key.filter(|k| is_valid_key(k)).map(|k| (source, k)))
        .collect();

    if valid.len() > 1 {
        let sources: Vec<&str> = valid.iter().map(|(source, _)| *source).collect();
        warn!(
            "Gemini API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    match valid.into_iter().next() {
        Some((source, key)) => {
            info!("Gemini API key loaded from {}", source);
            Ok(key)
        }
        None => Err(Error::Config(format!(
            "Gemini API key not configured. Please configure using one of:\n\
             1. Settings: matchday-ai param set gemini_api_key <key>\n\
             2. Environment: {}=your-key-here\n\
             3. TOML config: ~/.config/matchday/config.toml (gemini_api_key = \"your-key\")",
            GEMINI_API_KEY_ENV
        ))),
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
