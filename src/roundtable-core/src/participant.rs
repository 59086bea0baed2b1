//! Debate participant definitions.
//!
//! Represents human and AI-driven debaters, judges and observers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a participant in the debate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DebateRole {
    /// First speaker arguing in favor of the topic.
    Affirmative1,
    /// Second speaker arguing in favor of the topic.
    Affirmative2,
    /// First speaker arguing against the topic.
    Negative1,
    /// Second speaker arguing against the topic.
    Negative2,
    /// Scores formal statements at the end of each round.
    Judge,
    /// Watches without speaking.
    Observer,
    /// Takes turns but holds no side.
    #[default]
    Unassigned,
}

impl DebateRole {
    pub fn display_name(&self) -> &str {
        match self {
            DebateRole::Affirmative1 => "AFFIRMATIVE 1",
            DebateRole::Affirmative2 => "AFFIRMATIVE 2",
            DebateRole::Negative1 => "NEGATIVE 1",
            DebateRole::Negative2 => "NEGATIVE 2",
            DebateRole::Judge => "JUDGE",
            DebateRole::Observer => "OBSERVER",
            DebateRole::Unassigned => "UNASSIGNED",
        }
    }

    /// Whether this role takes turns speaking.
    pub fn is_speaker(&self) -> bool {
        !matches!(self, DebateRole::Judge | DebateRole::Observer)
    }

    pub fn is_affirmative(&self) -> bool {
        matches!(self, DebateRole::Affirmative1 | DebateRole::Affirmative2)
    }

    pub fn is_negative(&self) -> bool {
        matches!(self, DebateRole::Negative1 | DebateRole::Negative2)
    }
}

impl fmt::Display for DebateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Lifecycle of a participant within the current round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    #[default]
    Waiting,
    Speaking,
    Finished,
}

/// A participant in the debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    /// Stable identifier, unique within a session.
    pub id: String,
    /// Display name for this participant.
    pub name: String,
    /// The role this participant holds.
    #[serde(default)]
    pub role: DebateRole,
    /// Whether content is generated by the AI provider.
    #[serde(default = "default_ai_controlled")]
    pub ai_controlled: bool,
    /// Optional linked persona (character profile) description.
    #[serde(default)]
    pub persona: Option<String>,
    /// The LLM model to use (e.g., "gpt-4", "llama3:8b").
    #[serde(default)]
    pub model: Option<String>,
    #[serde(skip)]
    pub status: ParticipantStatus,
}

fn default_ai_controlled() -> bool {
    true
}

impl Participant {
    /// Create a new AI-controlled participant.
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: DebateRole) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            ai_controlled: true,
            persona: None,
            model: None,
            status: ParticipantStatus::Waiting,
        }
    }

    /// Create a new human participant.
    pub fn human(id: impl Into<String>, name: impl Into<String>, role: DebateRole) -> Self {
        Self {
            ai_controlled: false,
            ..Self::new(id, name, role)
        }
    }

    /// Set the persona description.
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Set the model used for generation.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Get the full display name with role.
    pub fn display_name_with_role(&self) -> String {
        format!("{} ({})", self.name, self.role.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_roles() {
        assert!(DebateRole::Affirmative1.is_speaker());
        assert!(DebateRole::Negative2.is_speaker());
        assert!(DebateRole::Unassigned.is_speaker());
        assert!(!DebateRole::Judge.is_speaker());
        assert!(!DebateRole::Observer.is_speaker());
    }

    #[test]
    fn test_display_name_with_role() {
        let p = Participant::new("a1", "Ada", DebateRole::Affirmative1);
        assert_eq!(p.display_name_with_role(), "Ada (AFFIRMATIVE 1)");
    }

    #[test]
    fn test_builders() {
        let ai = Participant::new("n1", "Ned", DebateRole::Negative1)
            .with_model("llama3:8b")
            .with_persona("A retired economist.");
        assert!(ai.ai_controlled);
        assert_eq!(ai.model.as_deref(), Some("llama3:8b"));
        assert_eq!(ai.persona.as_deref(), Some("A retired economist."));

        let human = Participant::human("a2", "Alan", DebateRole::Affirmative2);
        assert!(!human.ai_controlled);
        assert_eq!(human.status, ParticipantStatus::Waiting);
    }

    #[test]
    fn test_deserialize_defaults() {
        let p: Participant = toml::from_str(
            r#"
            id = "obs"
            name = "Olive"
            role = "observer"
            "#,
        )
        .unwrap();
        assert_eq!(p.role, DebateRole::Observer);
        assert!(p.ai_controlled);
        assert_eq!(p.status, ParticipantStatus::Waiting);
        assert!(p.persona.is_none());
    }
}
