//! Session state, statements and the events emitted while a session runs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::participant::{DebateRole, Participant};
use crate::retry::GenerationExhausted;
use crate::scoring::ScoreRecord;

/// Lifecycle of a debate session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Preparing,
    Ongoing,
    RoundComplete,
    Scoring,
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Preparing => "preparing",
            SessionStatus::Ongoing => "ongoing",
            SessionStatus::RoundComplete => "round complete",
            SessionStatus::Scoring => "scoring",
            SessionStatus::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// What a statement contains.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    InnerThoughts,
    FormalStatement,
    SystemNote,
}

/// One unit of content in the session history. Never mutated once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statement {
    pub id: String,
    pub participant_id: String,
    pub round: u32,
    pub content: String,
    pub kind: StatementKind,
    pub created_at: DateTime<Utc>,
    /// Ids of earlier statements this one builds on.
    #[serde(default)]
    pub references: Vec<String>,
}

impl Statement {
    pub fn new(
        participant_id: impl Into<String>,
        round: u32,
        kind: StatementKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            participant_id: participant_id.into(),
            round,
            content: content.into(),
            kind,
            created_at: Utc::now(),
            references: Vec::new(),
        }
    }

    pub fn with_references(mut self, references: Vec<String>) -> Self {
        self.references = references;
        self
    }
}

/// Mutable state of a session. Written only by the turn scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub status: SessionStatus,
    /// Current round, 1-indexed. Zero before the session starts.
    pub round: u32,
    pub total_rounds: u32,
    /// Participant ids in speaking order for the current round.
    pub turn_queue: Vec<String>,
    /// Index into `turn_queue` of the participant whose turn is next.
    pub queue_position: usize,
    pub current_speaker: Option<String>,
    pub statements: Vec<Statement>,
    pub scores: Vec<ScoreRecord>,
}

impl SessionState {
    pub fn new(total_rounds: u32) -> Self {
        Self {
            status: SessionStatus::Preparing,
            round: 0,
            total_rounds,
            turn_queue: Vec::new(),
            queue_position: 0,
            current_speaker: None,
            statements: Vec::new(),
            scores: Vec::new(),
        }
    }

    /// The speaker after the current one in this round, if any.
    pub fn next_speaker(&self) -> Option<&str> {
        if self.status != SessionStatus::Ongoing {
            return None;
        }
        self.turn_queue
            .get(self.queue_position + 1)
            .map(String::as_str)
    }

    /// Formal statements made during `round`, in history order.
    pub fn formal_statements(&self, round: u32) -> impl Iterator<Item = &Statement> {
        self.statements
            .iter()
            .filter(move |s| s.round == round && s.kind == StatementKind::FormalStatement)
    }
}

/// Immutable copy of the session handed to outside readers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub round: u32,
    pub total_rounds: u32,
    pub turn_queue: Vec<String>,
    pub current_speaker: Option<String>,
    pub next_speaker: Option<String>,
    pub participants: Vec<Participant>,
    pub statements: Vec<Statement>,
    pub scores: Vec<ScoreRecord>,
    /// Sum of active dimension weights when it is not 100.
    pub malformed_weight_total: Option<u32>,
}

/// Events emitted while a session runs.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session moved between states.
    StatusChanged {
        from: SessionStatus,
        to: SessionStatus,
    },
    /// A new round is starting.
    RoundStarted { round: u32, total_rounds: u32 },
    /// A participant is about to speak.
    SpeakerStarted {
        participant_id: String,
        name: String,
        role: DebateRole,
    },
    /// A slice of inner thoughts is being revealed.
    ThoughtChunk {
        participant_id: String,
        text: String,
        progress: u8,
    },
    /// The inner thoughts have been fully revealed.
    ThoughtsComplete { participant_id: String },
    /// A statement was appended to history.
    StatementAdded(Statement),
    /// A turn could not be generated; the same turn may be retried.
    TurnFailed(GenerationExhausted),
    /// A score was appended to history.
    ScoreAdded { record: ScoreRecord, fallback: bool },
    /// The final round has been scored.
    SessionCompleted,
}
