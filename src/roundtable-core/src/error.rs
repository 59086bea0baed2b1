//! Error types for the debate system.

use thiserror::Error;

use crate::retry::GenerationExhausted;
use crate::session::SessionStatus;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Invalid participant count: expected at least {min}, got {actual}")]
    InvalidParticipantCount { min: usize, actual: usize },

    #[error("Cannot {action} while the session is {status}")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
    },

    #[error(transparent)]
    GenerationExhausted(#[from] GenerationExhausted),

    #[error("Scoring dimension weights sum to {total}, expected 100")]
    MalformedScoreWeights { total: u32 },

    #[error("Participant '{participant_id}' is human; submit their statement instead")]
    HumanTurnPending { participant_id: String },

    #[error("Participant '{participant_id}' is AI-controlled; run their turn instead")]
    NotHumanTurn { participant_id: String },

    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Failures from a single AI provider call.
///
/// These are retried by [`crate::retry::execute`] and never reach the
/// scheduler's caller directly.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),

    #[error("Provider returned an empty response")]
    EmptyResponse,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Other(String),
}
