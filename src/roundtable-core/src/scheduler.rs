//! Round and turn orchestration.
//!
//! [`TurnScheduler`] owns the [`SessionState`] and is its only writer. It
//! moves through `Preparing -> Ongoing -> RoundComplete -> Scoring ->
//! (Ongoing | Completed)`; any action requested in a state that does not
//! allow it fails with [`DebateError::InvalidTransition`].

use std::sync::Arc;

use tokio_stream::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{SessionConfig, Topic};
use crate::error::DebateError;
use crate::format::DebateFormat;
use crate::participant::{Participant, ParticipantStatus};
use crate::provider::{AiProvider, TurnContext};
use crate::retry::{self, GenerationExhausted, OperationKind, RetryContext, RetryPolicy};
use crate::reveal::{RevealEvent, RevealOptions, StreamingRevealer};
use crate::scoring::{
    self, RankedEntry, ScoreRecord, ScoringDimension, Statistics, check_weights, mock_score,
};
use crate::session::{
    SessionEvent, SessionSnapshot, SessionState, SessionStatus, Statement, StatementKind,
};

/// Callback for session events.
pub type SessionCallback = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// Drives a debate session turn by turn and round by round.
pub struct TurnScheduler {
    provider: Arc<dyn AiProvider>,
    topic: Topic,
    format: DebateFormat,
    participants: Vec<Participant>,
    judge_id: String,
    dimensions: Vec<ScoringDimension>,
    retry_policy: RetryPolicy,
    /// `None` disables the streaming reveal of inner thoughts.
    reveal: Option<RevealOptions>,
    state: SessionState,
    revealer: StreamingRevealer,
    malformed_weight_total: Option<u32>,
    callback: Option<SessionCallback>,
}

impl TurnScheduler {
    /// Create a scheduler in the `Preparing` state.
    pub fn new(config: SessionConfig, provider: Arc<dyn AiProvider>) -> Result<Self, DebateError> {
        config.validate()?;

        let malformed_weight_total = match check_weights(&config.dimensions) {
            Ok(()) => None,
            Err(DebateError::MalformedScoreWeights { total }) => {
                warn!(total, "Scoring dimension weights do not sum to 100");
                Some(total)
            }
            Err(e) => return Err(e),
        };

        let reveal = config.reveal.enabled.then(|| config.reveal.options());

        Ok(Self {
            provider,
            topic: config.topic,
            format: config.format,
            participants: config.participants,
            judge_id: config.judge_id,
            dimensions: config.dimensions,
            retry_policy: config.retry.policy(),
            reveal,
            state: SessionState::new(config.rounds),
            revealer: StreamingRevealer::new(),
            malformed_weight_total,
            callback: None,
        })
    }

    /// Set a callback for session events.
    pub fn with_callback(mut self, callback: SessionCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_reveal(mut self, reveal: Option<RevealOptions>) -> Self {
        self.reveal = reveal;
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    /// Read-only view of the session state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// All statements so far, oldest first.
    pub fn history(&self) -> &[Statement] {
        &self.state.statements
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Owned copy of the session for outside readers.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.state.status,
            round: self.state.round,
            total_rounds: self.state.total_rounds,
            turn_queue: self.state.turn_queue.clone(),
            current_speaker: self.state.current_speaker.clone(),
            next_speaker: self.state.next_speaker().map(str::to_string),
            participants: self.participants.clone(),
            statements: self.state.statements.clone(),
            scores: self.state.scores.clone(),
            malformed_weight_total: self.malformed_weight_total,
        }
    }

    /// Re-check the configured dimension weights.
    pub fn weight_check(&self) -> Result<(), DebateError> {
        check_weights(&self.dimensions)
    }

    /// Statistics over every score recorded so far.
    pub fn statistics(&self) -> Statistics {
        scoring::statistics(&self.state.scores)
    }

    /// Rankings over every score recorded so far.
    pub fn rankings(&self) -> Vec<RankedEntry> {
        scoring::rankings(&self.state.scores, &self.participants)
    }

    /// `Preparing -> Ongoing`: build the turn queue for round 1.
    pub fn start(&mut self) -> Result<(), DebateError> {
        self.require("start the session", SessionStatus::Preparing)?;
        info!(
            topic = %self.topic.title,
            format = self.format.name(),
            rounds = self.state.total_rounds,
            "Starting debate session"
        );
        self.begin_round(1);
        self.set_status(SessionStatus::Ongoing);
        Ok(())
    }

    /// Generate thoughts and a formal statement for the current speaker.
    ///
    /// On exhausted retries the turn is abandoned without advancing, so the
    /// same turn can be run again.
    pub async fn run_turn(&mut self) -> Result<Statement, DebateError> {
        self.require("run a turn", SessionStatus::Ongoing)?;
        let speaker = self.current_participant()?;
        if !speaker.ai_controlled {
            return Err(DebateError::HumanTurnPending {
                participant_id: speaker.id,
            });
        }

        self.set_participant_status(&speaker.id, ParticipantStatus::Speaking);
        self.emit_event(SessionEvent::SpeakerStarted {
            participant_id: speaker.id.clone(),
            name: speaker.name.clone(),
            role: speaker.role,
        });

        let context = self.turn_context();
        let provider = Arc::clone(&self.provider);

        let thoughts_context = RetryContext::new(OperationKind::Thoughts, speaker.id.as_str());
        let result = retry::execute(&self.retry_policy, &thoughts_context, || {
            provider.generate_thoughts(&speaker, &context)
        })
        .await;
        let thoughts = match result {
            Ok(thoughts) => thoughts,
            Err(failure) => return Err(self.abandon_turn(&speaker, failure)),
        };

        if let Some(options) = self.reveal {
            self.reveal_thoughts(&speaker.id, &thoughts, options).await;
        }

        let speech_context = RetryContext::new(OperationKind::Speech, speaker.id.as_str());
        let result = retry::execute(&self.retry_policy, &speech_context, || {
            provider.generate_formal_statement(&speaker, &thoughts, &context)
        })
        .await;
        let speech = match result {
            Ok(speech) => speech,
            Err(failure) => return Err(self.abandon_turn(&speaker, failure)),
        };

        let round = self.state.round;
        let thoughts = Statement::new(&speaker.id, round, StatementKind::InnerThoughts, thoughts);
        let formal = Statement::new(&speaker.id, round, StatementKind::FormalStatement, speech)
            .with_references(vec![thoughts.id.clone()]);

        self.append_statement(thoughts);
        self.append_statement(formal.clone());
        self.finish_turn(&speaker.id);
        Ok(formal)
    }

    /// Record a human speaker's statement and advance.
    pub fn submit_human_statement(
        &mut self,
        content: impl Into<String>,
    ) -> Result<Statement, DebateError> {
        self.require("submit a statement", SessionStatus::Ongoing)?;
        let speaker = self.current_participant()?;
        if speaker.ai_controlled {
            return Err(DebateError::NotHumanTurn {
                participant_id: speaker.id,
            });
        }

        let statement = Statement::new(
            &speaker.id,
            self.state.round,
            StatementKind::FormalStatement,
            content,
        );
        self.append_statement(statement.clone());
        self.finish_turn(&speaker.id);
        Ok(statement)
    }

    /// Complete the current speaker's turn with an empty statement.
    pub fn skip_current_speaker(&mut self) -> Result<Statement, DebateError> {
        self.require("skip the current speaker", SessionStatus::Ongoing)?;
        let speaker = self.current_participant()?;
        self.revealer.stop();

        info!(participant_id = %speaker.id, round = self.state.round, "Skipping speaker");
        let statement = Statement::new(
            &speaker.id,
            self.state.round,
            StatementKind::FormalStatement,
            "",
        );
        self.append_statement(statement.clone());
        self.finish_turn(&speaker.id);
        Ok(statement)
    }

    /// `RoundComplete -> Scoring -> (Ongoing | Completed)`.
    ///
    /// Every formal statement of the round gets exactly one score, skipped
    /// and empty ones included. A statement whose judge call is exhausted
    /// gets a fallback score instead, so this never fails once scoring has
    /// begun.
    pub async fn score_round(&mut self) -> Result<Vec<ScoreRecord>, DebateError> {
        self.require("score the round", SessionStatus::RoundComplete)?;
        let judge = self
            .participant(&self.judge_id)
            .cloned()
            .ok_or_else(|| DebateError::UnknownParticipant(self.judge_id.clone()))?;

        self.set_status(SessionStatus::Scoring);

        let round = self.state.round;
        let statements: Vec<Statement> = self
            .state
            .formal_statements(round)
            .cloned()
            .collect();
        let provider = Arc::clone(&self.provider);

        let mut records = Vec::with_capacity(statements.len());
        for statement in &statements {
            let context = RetryContext::new(OperationKind::Score, statement.participant_id.as_str())
                .with_on_error(Box::new(|failure: &GenerationExhausted| {
                    warn!(
                        participant_id = %failure.participant_id,
                        error = %failure.message,
                        "Judge unavailable, using fallback score"
                    );
                }));

            let result = retry::execute(&self.retry_policy, &context, || {
                provider.generate_score(&judge, statement, &self.dimensions)
            })
            .await;

            let (record, fallback) = match result {
                Ok(score) => (
                    ScoreRecord {
                        id: Uuid::new_v4().to_string(),
                        judge_id: judge.id.clone(),
                        participant_id: statement.participant_id.clone(),
                        statement_id: statement.id.clone(),
                        round,
                        dimensions: score.dimensions,
                        total_score: score.total_score,
                        comment: score.comment,
                        feedback: score.feedback,
                    },
                    false,
                ),
                Err(_) => (mock_score(statement), true),
            };

            self.state.scores.push(record.clone());
            self.emit_event(SessionEvent::ScoreAdded {
                record: record.clone(),
                fallback,
            });
            records.push(record);
        }

        if round < self.state.total_rounds {
            self.begin_round(round + 1);
            self.set_status(SessionStatus::Ongoing);
        } else {
            self.set_status(SessionStatus::Completed);
            self.emit_event(SessionEvent::SessionCompleted);
        }

        Ok(records)
    }

    /// Stop any active reveal. Called on teardown.
    pub fn shutdown(&mut self) {
        self.revealer.stop();
    }

    fn require(&self, action: &'static str, expected: SessionStatus) -> Result<(), DebateError> {
        if self.state.status == expected {
            Ok(())
        } else {
            Err(DebateError::InvalidTransition {
                action,
                status: self.state.status,
            })
        }
    }

    fn set_status(&mut self, to: SessionStatus) {
        let from = self.state.status;
        self.state.status = to;
        info!(%from, %to, round = self.state.round, "Session status changed");
        self.emit_event(SessionEvent::StatusChanged { from, to });
    }

    fn begin_round(&mut self, round: u32) {
        self.state.round = round;
        self.state.turn_queue = self.format.turn_order(&self.participants, round);
        self.state.queue_position = 0;
        for participant in &mut self.participants {
            participant.status = ParticipantStatus::Waiting;
        }
        self.state.current_speaker = self.state.turn_queue.first().cloned();

        self.emit_event(SessionEvent::RoundStarted {
            round,
            total_rounds: self.state.total_rounds,
        });
    }

    fn current_participant(&self) -> Result<Participant, DebateError> {
        let id = self
            .state
            .turn_queue
            .get(self.state.queue_position)
            .ok_or(DebateError::InvalidTransition {
                action: "find the current speaker",
                status: self.state.status,
            })?;
        self.participant(id)
            .cloned()
            .ok_or_else(|| DebateError::UnknownParticipant(id.clone()))
    }

    fn turn_context(&self) -> TurnContext {
        TurnContext {
            topic: self.topic.clone(),
            round: self.state.round,
            total_rounds: self.state.total_rounds,
            prior_statements: self
                .state
                .statements
                .iter()
                .filter(|s| s.kind == StatementKind::FormalStatement && !s.content.is_empty())
                .cloned()
                .collect(),
        }
    }

    async fn reveal_thoughts(
        &mut self,
        participant_id: &str,
        thoughts: &str,
        options: RevealOptions,
    ) {
        let mut stream = self.revealer.start(thoughts, options);
        while let Some(event) = stream.next().await {
            match event {
                RevealEvent::Chunk { text, progress } => {
                    self.emit_event(SessionEvent::ThoughtChunk {
                        participant_id: participant_id.to_string(),
                        text,
                        progress,
                    });
                }
                RevealEvent::Complete => {
                    self.emit_event(SessionEvent::ThoughtsComplete {
                        participant_id: participant_id.to_string(),
                    });
                }
            }
        }
        self.revealer.stop();
    }

    fn abandon_turn(
        &mut self,
        speaker: &Participant,
        failure: GenerationExhausted,
    ) -> DebateError {
        self.revealer.stop();
        self.set_participant_status(&speaker.id, ParticipantStatus::Waiting);
        warn!(
            participant_id = %speaker.id,
            kind = %failure.kind,
            "Turn abandoned after exhausting retries"
        );
        self.emit_event(SessionEvent::TurnFailed(failure.clone()));
        DebateError::GenerationExhausted(failure)
    }

    fn finish_turn(&mut self, participant_id: &str) {
        self.set_participant_status(participant_id, ParticipantStatus::Finished);
        self.state.queue_position += 1;

        if self.state.queue_position >= self.state.turn_queue.len() {
            self.state.current_speaker = None;
            self.set_status(SessionStatus::RoundComplete);
        } else {
            self.state.current_speaker =
                Some(self.state.turn_queue[self.state.queue_position].clone());
        }
    }

    fn set_participant_status(&mut self, participant_id: &str, status: ParticipantStatus) {
        if let Some(participant) = self.participants.iter_mut().find(|p| p.id == participant_id) {
            participant.status = status;
        }
    }

    fn append_statement(&mut self, statement: Statement) {
        self.state.statements.push(statement.clone());
        self.emit_event(SessionEvent::StatementAdded(statement));
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: SessionEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

impl Drop for TurnScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use crate::error::ProviderError;
    use crate::participant::DebateRole;
    use crate::provider::JudgeScore;
    use crate::scoring::FALLBACK_JUDGE_ID;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Provider with scripted failures and predictable content.
    #[derive(Default)]
    struct ScriptedProvider {
        thought_failures: Mutex<HashMap<String, u32>>,
        speech_failures: Mutex<HashMap<String, u32>>,
        failing_judge_targets: Vec<String>,
        score_calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn failing_thoughts(participant_id: &str, times: u32) -> Self {
            let provider = Self::default();
            provider
                .thought_failures
                .lock()
                .unwrap()
                .insert(participant_id.to_string(), times);
            provider
        }

        fn failing_speech(participant_id: &str, times: u32) -> Self {
            let provider = Self::default();
            provider
                .speech_failures
                .lock()
                .unwrap()
                .insert(participant_id.to_string(), times);
            provider
        }
    }

    fn take_failure(failures: &Mutex<HashMap<String, u32>>, participant_id: &str) -> bool {
        let mut failures = failures.lock().unwrap();
        match failures.get_mut(participant_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    #[async_trait]
    impl AiProvider for ScriptedProvider {
        async fn generate_thoughts(
            &self,
            participant: &Participant,
            context: &TurnContext,
        ) -> Result<String, ProviderError> {
            if take_failure(&self.thought_failures, &participant.id) {
                return Err(ProviderError::Other("thoughts offline".into()));
            }
            Ok(format!("{} plans round {}", participant.name, context.round))
        }

        async fn generate_formal_statement(
            &self,
            participant: &Participant,
            thoughts: &str,
            context: &TurnContext,
        ) -> Result<String, ProviderError> {
            if take_failure(&self.speech_failures, &participant.id) {
                return Err(ProviderError::Other("speech offline".into()));
            }
            Ok(format!(
                "{} speaks after {} statements ({})",
                participant.name,
                context.prior_statements.len(),
                thoughts
            ))
        }

        async fn generate_score(
            &self,
            _judge: &Participant,
            statement: &Statement,
            _dimensions: &[ScoringDimension],
        ) -> Result<JudgeScore, ProviderError> {
            self.score_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_judge_targets.contains(&statement.participant_id) {
                return Err(ProviderError::Other("judge timeout".into()));
            }
            let total = match statement.participant_id.as_str() {
                "aff-1" => 90.0,
                "neg-1" => 80.0,
                "aff-2" => 70.0,
                _ => 60.0,
            };
            Ok(JudgeScore {
                dimensions: BTreeMap::from([
                    ("logic".to_string(), total),
                    ("evidence".to_string(), total - 10.0),
                ]),
                total_score: total,
                comment: "Reasonable.".to_string(),
                feedback: None,
            })
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100), 2.0)
    }

    fn scheduler_with(provider: Arc<ScriptedProvider>, rounds: u32) -> TurnScheduler {
        let mut config = default_config("Tea beats coffee");
        config.rounds = rounds;
        TurnScheduler::new(config, provider)
            .unwrap()
            .with_retry_policy(fast_retry())
            .with_reveal(None)
    }

    fn recording(scheduler: TurnScheduler) -> (TurnScheduler, Arc<Mutex<Vec<SessionEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let scheduler = scheduler.with_callback(Box::new(move |event| {
            sink.lock().unwrap().push(event);
        }));
        (scheduler, events)
    }

    async fn run_round(scheduler: &mut TurnScheduler) {
        while scheduler.status() == SessionStatus::Ongoing {
            scheduler.run_turn().await.unwrap();
        }
    }

    fn assert_invalid(result: Result<impl std::fmt::Debug, DebateError>) {
        assert!(
            matches!(result, Err(DebateError::InvalidTransition { .. })),
            "expected InvalidTransition, got {result:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_structured_session() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut scheduler = scheduler_with(Arc::clone(&provider), 2);
        assert_eq!(scheduler.status(), SessionStatus::Preparing);

        scheduler.start().unwrap();
        assert_eq!(scheduler.status(), SessionStatus::Ongoing);
        assert_eq!(
            scheduler.state().turn_queue,
            vec!["aff-1", "neg-1", "aff-2", "neg-2"]
        );
        assert_eq!(scheduler.state().current_speaker.as_deref(), Some("aff-1"));

        for _ in 0..4 {
            scheduler.run_turn().await.unwrap();
        }
        assert_eq!(scheduler.status(), SessionStatus::RoundComplete);
        assert!(scheduler.state().current_speaker.is_none());

        let scores = scheduler.score_round().await.unwrap();
        assert_eq!(scores.len(), 4);
        assert_eq!(scheduler.state().scores.len(), 4);
        assert_eq!(scheduler.state().round, 2);
        assert_eq!(scheduler.status(), SessionStatus::Ongoing);
        assert_eq!(scheduler.state().queue_position, 0);
        assert_eq!(scheduler.state().current_speaker.as_deref(), Some("aff-1"));

        run_round(&mut scheduler).await;
        assert_eq!(scheduler.status(), SessionStatus::RoundComplete);
        scheduler.score_round().await.unwrap();
        assert_eq!(scheduler.status(), SessionStatus::Completed);
        assert_eq!(scheduler.state().scores.len(), 8);
        assert_eq!(scheduler.history().len(), 16);
        assert_eq!(provider.score_calls.load(Ordering::SeqCst), 8);

        assert_invalid(scheduler.start());
        assert_invalid(scheduler.run_turn().await);
        assert_invalid(scheduler.skip_current_speaker());
        assert_invalid(scheduler.submit_human_statement("late"));
        assert_invalid(scheduler.score_round().await);

        let stats = scheduler.statistics();
        assert_eq!(stats.overall.count, 8);
        assert_eq!(stats.overall.highest, 90.0);
        let ranked = scheduler.rankings();
        assert_eq!(ranked[0].participant_id, "aff-1");
        assert_eq!(ranked[0].total_score, 180.0);
        assert_eq!(ranked[3].participant_name, "Devon");
        assert_eq!(scheduler.snapshot().status, SessionStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_rejected_out_of_order() {
        let mut scheduler = scheduler_with(Arc::new(ScriptedProvider::default()), 1);
        assert_invalid(scheduler.run_turn().await);
        assert_invalid(scheduler.skip_current_speaker());
        assert_invalid(scheduler.score_round().await);

        scheduler.start().unwrap();
        assert_invalid(scheduler.start());
        assert_invalid(scheduler.score_round().await);

        run_round(&mut scheduler).await;
        assert_invalid(scheduler.run_turn().await);
        match scheduler.skip_current_speaker() {
            Err(DebateError::InvalidTransition { status, .. }) => {
                assert_eq!(status, SessionStatus::RoundComplete)
            }
            other => panic!("Expected InvalidTransition, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_thoughts_keep_turn_in_place() {
        let provider = Arc::new(ScriptedProvider::failing_thoughts("aff-1", 3));
        let (mut scheduler, events) = recording(scheduler_with(provider, 1));
        scheduler.start().unwrap();

        match scheduler.run_turn().await {
            Err(DebateError::GenerationExhausted(failure)) => {
                assert_eq!(failure.kind, OperationKind::Thoughts);
                assert_eq!(failure.participant_id, "aff-1");
                assert_eq!(failure.attempts, 3);
                assert!(failure.to_string().contains("thoughts offline"));
            }
            other => panic!("Expected GenerationExhausted, got {other:?}"),
        }

        assert_eq!(scheduler.status(), SessionStatus::Ongoing);
        assert_eq!(scheduler.state().queue_position, 0);
        assert_eq!(scheduler.state().current_speaker.as_deref(), Some("aff-1"));
        assert!(scheduler.history().is_empty());
        assert_eq!(
            scheduler.participant("aff-1").unwrap().status,
            ParticipantStatus::Waiting
        );
        assert!(
            events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, SessionEvent::TurnFailed(f) if f.participant_id == "aff-1"))
        );

        let statement = scheduler.run_turn().await.unwrap();
        assert_eq!(statement.participant_id, "aff-1");
        assert_eq!(scheduler.state().queue_position, 1);
        assert_eq!(
            scheduler.participant("aff-1").unwrap().status,
            ParticipantStatus::Finished
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_speech_appends_nothing() {
        let provider = Arc::new(ScriptedProvider::failing_speech("aff-1", 3));
        let mut scheduler = scheduler_with(provider, 1);
        scheduler.start().unwrap();

        match scheduler.run_turn().await {
            Err(DebateError::GenerationExhausted(failure)) => {
                assert_eq!(failure.kind, OperationKind::Speech)
            }
            other => panic!("Expected GenerationExhausted, got {other:?}"),
        }
        assert!(scheduler.history().is_empty());
        assert_eq!(scheduler.state().queue_position, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_absorbed() {
        let provider = Arc::new(ScriptedProvider::failing_speech("aff-1", 2));
        let mut scheduler = scheduler_with(provider, 1);
        scheduler.start().unwrap();

        let statement = scheduler.run_turn().await.unwrap();
        assert!(statement.content.starts_with("Avery speaks"));
        assert_eq!(scheduler.state().queue_position, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_statement_links_thoughts_and_context_grows() {
        let mut scheduler = scheduler_with(Arc::new(ScriptedProvider::default()), 1);
        scheduler.start().unwrap();

        let first = scheduler.run_turn().await.unwrap();
        let second = scheduler.run_turn().await.unwrap();

        let thoughts = &scheduler.history()[0];
        assert_eq!(thoughts.kind, StatementKind::InnerThoughts);
        assert_eq!(first.references, vec![thoughts.id.clone()]);
        assert!(first.content.contains("after 0 statements"));
        assert!(second.content.contains("after 1 statements"));
        assert_eq!(second.participant_id, "neg-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_judge_failure_falls_back_to_mock_score() {
        let provider = Arc::new(ScriptedProvider {
            failing_judge_targets: vec!["neg-1".to_string()],
            ..ScriptedProvider::default()
        });
        let (mut scheduler, events) = recording(scheduler_with(Arc::clone(&provider), 1));
        scheduler.start().unwrap();
        run_round(&mut scheduler).await;

        let scores = scheduler.score_round().await.unwrap();
        assert_eq!(scores.len(), 4);
        assert_eq!(scheduler.status(), SessionStatus::Completed);
        // Three successful judge calls plus three attempts for neg-1.
        assert_eq!(provider.score_calls.load(Ordering::SeqCst), 6);

        let fallback = scores.iter().find(|s| s.participant_id == "neg-1").unwrap();
        assert_eq!(fallback.judge_id, FALLBACK_JUDGE_ID);
        let expected = fallback.dimensions["logic"] * 0.3
            + fallback.dimensions["evidence"] * 0.3
            + fallback.dimensions["delivery"] * 0.2
            + fallback.dimensions["rebuttal"] * 0.2;
        assert!((fallback.total_score - expected).abs() < 1e-9);

        assert!(
            scores
                .iter()
                .filter(|s| s.participant_id != "neg-1")
                .all(|s| s.judge_id == "judge")
        );

        let fallback_events = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SessionEvent::ScoreAdded { fallback: true, .. }))
            .count();
        assert_eq!(fallback_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_preserves_round_accounting() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut scheduler = scheduler_with(Arc::clone(&provider), 2);
        scheduler.start().unwrap();

        let skipped = scheduler.skip_current_speaker().unwrap();
        assert_eq!(skipped.participant_id, "aff-1");
        assert!(skipped.content.is_empty());
        assert_eq!(skipped.kind, StatementKind::FormalStatement);
        assert_eq!(scheduler.state().current_speaker.as_deref(), Some("neg-1"));

        run_round(&mut scheduler).await;
        assert_eq!(scheduler.status(), SessionStatus::RoundComplete);

        let scores = scheduler.score_round().await.unwrap();
        assert_eq!(scores.len(), 4);
        assert_eq!(provider.score_calls.load(Ordering::SeqCst), 4);
        let skipped_score = scores
            .iter()
            .find(|s| s.participant_id == "aff-1")
            .unwrap();
        assert_eq!(skipped_score.statement_id, skipped.id);
        assert_eq!(scheduler.state().round, 2);

        let ranked: Vec<_> = scheduler
            .rankings()
            .into_iter()
            .map(|e| e.participant_id)
            .collect();
        assert_eq!(ranked.len(), 4);
        assert!(ranked.iter().any(|id| id == "aff-1"));
        assert_eq!(scheduler.statistics().overall.count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_active_reveal() {
        let mut scheduler = scheduler_with(Arc::new(ScriptedProvider::default()), 1);
        let mut stream = scheduler.revealer.start(
            "a long stretch of private reasoning",
            RevealOptions {
                chunk_size: 2,
                delay: Duration::from_millis(10),
            },
        );
        assert!(matches!(stream.next().await, Some(RevealEvent::Chunk { .. })));
        assert!(scheduler.revealer.is_active());

        scheduler.shutdown();
        assert!(!scheduler.revealer.is_active());
        assert_eq!(stream.next().await, None);

        scheduler.shutdown();
        assert_eq!(scheduler.status(), SessionStatus::Preparing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_active_reveal() {
        let mut scheduler = scheduler_with(Arc::new(ScriptedProvider::default()), 1);
        let mut stream = scheduler.revealer.start(
            "a long stretch of private reasoning",
            RevealOptions {
                chunk_size: 2,
                delay: Duration::from_millis(10),
            },
        );
        assert!(matches!(stream.next().await, Some(RevealEvent::Chunk { .. })));

        drop(scheduler);
        assert_eq!(stream.next().await, None);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_human_turns_are_submitted() {
        let mut config = default_config("Tea beats coffee");
        config.rounds = 1;
        config.participants[0] = Participant::human("aff-1", "Avery", DebateRole::Affirmative1);
        let mut scheduler = TurnScheduler::new(config, Arc::new(ScriptedProvider::default()))
            .unwrap()
            .with_retry_policy(fast_retry())
            .with_reveal(None);
        scheduler.start().unwrap();

        assert!(matches!(
            scheduler.run_turn().await,
            Err(DebateError::HumanTurnPending { participant_id }) if participant_id == "aff-1"
        ));
        assert_eq!(scheduler.state().queue_position, 0);

        let statement = scheduler.submit_human_statement("Tea is civilised.").unwrap();
        assert_eq!(statement.content, "Tea is civilised.");
        assert_eq!(scheduler.history().len(), 1);

        assert!(matches!(
            scheduler.submit_human_statement("Not my turn"),
            Err(DebateError::NotHumanTurn { participant_id }) if participant_id == "neg-1"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_thoughts_revealed_before_statement() {
        let provider = Arc::new(ScriptedProvider::default());
        let scheduler = scheduler_with(provider, 1).with_reveal(Some(RevealOptions {
            chunk_size: 5,
            delay: Duration::from_millis(10),
        }));
        let (mut scheduler, events) = recording(scheduler);
        scheduler.start().unwrap();
        scheduler.run_turn().await.unwrap();

        let events = events.lock().unwrap();
        let revealed: String = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ThoughtChunk { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(revealed, "Avery plans round 1");

        let complete_at = events
            .iter()
            .position(|e| matches!(e, SessionEvent::ThoughtsComplete { .. }))
            .unwrap();
        let added_at = events
            .iter()
            .position(|e| matches!(e, SessionEvent::StatementAdded(_)))
            .unwrap();
        assert!(complete_at < added_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_speakers_and_weights() {
        let mut config = default_config("Tea beats coffee");
        config.dimensions[0].weight = 50;
        let mut scheduler = TurnScheduler::new(config, Arc::new(ScriptedProvider::default()))
            .unwrap()
            .with_reveal(None);

        assert!(matches!(
            scheduler.weight_check(),
            Err(DebateError::MalformedScoreWeights { total: 120 })
        ));
        scheduler.start().unwrap();

        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.malformed_weight_total, Some(120));
        assert_eq!(snapshot.current_speaker.as_deref(), Some("aff-1"));
        assert_eq!(snapshot.next_speaker.as_deref(), Some("neg-1"));
        assert_eq!(snapshot.round, 1);
        assert!(
            snapshot
                .participants
                .iter()
                .any(|p| p.role == DebateRole::Judge)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_format_rotates_between_rounds() {
        let mut config = default_config("Tea beats coffee");
        config.rounds = 2;
        config.format = DebateFormat::Free { rotate_start: true };
        let mut scheduler = TurnScheduler::new(config, Arc::new(ScriptedProvider::default()))
            .unwrap()
            .with_retry_policy(fast_retry())
            .with_reveal(None);

        scheduler.start().unwrap();
        assert_eq!(
            scheduler.state().turn_queue,
            vec!["aff-1", "neg-1", "aff-2", "neg-2"]
        );
        run_round(&mut scheduler).await;
        scheduler.score_round().await.unwrap();
        assert_eq!(
            scheduler.state().turn_queue,
            vec!["neg-1", "aff-2", "neg-2", "aff-1"]
        );
        assert!(
            scheduler
                .participants()
                .iter()
                .all(|p| p.status == ParticipantStatus::Waiting)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_events_follow_state_machine() {
        let (mut scheduler, events) =
            recording(scheduler_with(Arc::new(ScriptedProvider::default()), 1));
        scheduler.start().unwrap();
        run_round(&mut scheduler).await;
        scheduler.score_round().await.unwrap();

        let transitions: Vec<(SessionStatus, SessionStatus)> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::StatusChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                (SessionStatus::Preparing, SessionStatus::Ongoing),
                (SessionStatus::Ongoing, SessionStatus::RoundComplete),
                (SessionStatus::RoundComplete, SessionStatus::Scoring),
                (SessionStatus::Scoring, SessionStatus::Completed),
            ]
        );
        assert!(matches!(
            events.lock().unwrap().last(),
            Some(SessionEvent::SessionCompleted)
        ));
    }
}
