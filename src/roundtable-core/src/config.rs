//! Configuration module for loading TOML session files.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DebateError;
use crate::format::DebateFormat;
use crate::participant::{DebateRole, Participant};
use crate::retry::RetryPolicy;
use crate::reveal::RevealOptions;
use crate::scoring::{ScoringDimension, default_dimensions};

/// What is being debated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topic {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Topic {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Root configuration structure for one session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub topic: Topic,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default)]
    pub format: DebateFormat,
    pub participants: Vec<Participant>,
    /// Id of the participant who scores each round.
    pub judge_id: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<ScoringDimension>,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub reveal: RevealSettings,
}

fn default_rounds() -> u32 {
    3
}

/// Retry settings as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_factor,
        )
    }
}

/// Streaming reveal settings for inner thoughts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RevealSettings {
    pub enabled: bool,
    pub chunk_size: usize,
    pub delay_ms: u64,
}

impl Default for RevealSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_size: 4,
            delay_ms: 30,
        }
    }
}

impl RevealSettings {
    pub fn options(&self) -> RevealOptions {
        RevealOptions {
            chunk_size: self.chunk_size,
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, DebateError> {
        toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Look up the configured judge.
    pub fn judge(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == self.judge_id)
    }

    /// Check that a session can be run with this configuration.
    ///
    /// Dimension weights are not checked here; see
    /// [`crate::scoring::check_weights`].
    pub fn validate(&self) -> Result<(), DebateError> {
        if self.rounds == 0 {
            return Err(DebateError::ConfigError(
                "A session needs at least one round".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for participant in &self.participants {
            if !seen.insert(participant.id.as_str()) {
                return Err(DebateError::ConfigError(format!(
                    "Duplicate participant id '{}'",
                    participant.id
                )));
            }
        }

        let speakers = self.format.turn_order(&self.participants, 1);
        if speakers.is_empty() {
            return Err(DebateError::InvalidParticipantCount { min: 1, actual: 0 });
        }

        if let DebateFormat::Structured { .. } = self.format {
            let has_affirmative = self.participants.iter().any(|p| p.role.is_affirmative());
            let has_negative = self.participants.iter().any(|p| p.role.is_negative());
            if !has_affirmative || !has_negative {
                return Err(DebateError::ConfigError(
                    "A structured debate needs at least one affirmative and one negative debater"
                        .to_string(),
                ));
            }
        }

        if self.judge().is_none() {
            return Err(DebateError::UnknownParticipant(self.judge_id.clone()));
        }

        Ok(())
    }
}

/// Default configuration embedded in the binary: two debaters per side and
/// one AI judge.
pub fn default_config(topic: &str) -> SessionConfig {
    SessionConfig {
        topic: Topic::new(topic, ""),
        rounds: default_rounds(),
        format: DebateFormat::default(),
        participants: vec![
            Participant::new("aff-1", "Avery", DebateRole::Affirmative1),
            Participant::new("neg-1", "Blake", DebateRole::Negative1),
            Participant::new("aff-2", "Casey", DebateRole::Affirmative2),
            Participant::new("neg-2", "Devon", DebateRole::Negative2),
            Participant::new("judge", "The Judge", DebateRole::Judge)
                .with_persona("An impartial, experienced debate adjudicator."),
        ],
        judge_id: "judge".to_string(),
        dimensions: default_dimensions(),
        retry: RetrySettings::default(),
        reveal: RevealSettings::default(),
    }
}
