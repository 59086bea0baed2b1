//! Roundtable Core Library
//!
//! Turn and round orchestration for multi-participant debates, with
//! retrying AI generation, streaming reveal of generated text and score
//! aggregation.

pub mod config;
pub mod error;
pub mod format;
pub mod participant;
pub mod provider;
pub mod retry;
pub mod reveal;
pub mod scheduler;
pub mod scoring;
pub mod session;

pub use config::{SessionConfig, Topic, default_config};
pub use error::{DebateError, ProviderError};
pub use format::DebateFormat;
pub use participant::{DebateRole, Participant, ParticipantStatus};
pub use provider::{AiProvider, JudgeScore, OpenAiProvider, OpenAiSettings, TurnContext};
pub use retry::{GenerationExhausted, OperationKind, RetryContext, RetryPolicy};
pub use reveal::{RevealEvent, RevealOptions, RevealStream, StreamingRevealer};
pub use scheduler::{SessionCallback, TurnScheduler};
pub use scoring::{RankedEntry, ScoreRecord, ScoringDimension, Statistics};
pub use session::{
    SessionEvent, SessionSnapshot, SessionState, SessionStatus, Statement, StatementKind,
};
