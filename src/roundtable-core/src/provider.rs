//! AI provider contract and an OpenAI-compatible implementation.
//!
//! The scheduler only talks to [`AiProvider`]. Every call may fail; failures
//! are retried by [`crate::retry::execute`].

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Topic;
use crate::error::ProviderError;
use crate::participant::Participant;
use crate::scoring::{ScoreFeedback, ScoringDimension};
use crate::session::Statement;

/// Structured context for thoughts and statement generation.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub topic: Topic,
    pub round: u32,
    pub total_rounds: u32,
    /// Formal statements made so far, oldest first.
    pub prior_statements: Vec<Statement>,
}

/// A judge's raw evaluation of one statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JudgeScore {
    pub dimensions: BTreeMap<String, f64>,
    #[serde(alias = "total_score")]
    pub total_score: f64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub feedback: Option<ScoreFeedback>,
}

/// Generates participant content and judge scores.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Private reasoning a participant does before speaking.
    async fn generate_thoughts(
        &self,
        participant: &Participant,
        context: &TurnContext,
    ) -> Result<String, ProviderError>;

    /// The public speech, informed by the participant's thoughts.
    async fn generate_formal_statement(
        &self,
        participant: &Participant,
        thoughts: &str,
        context: &TurnContext,
    ) -> Result<String, ProviderError>;

    /// One judge's evaluation of one statement.
    async fn generate_score(
        &self,
        judge: &Participant,
        statement: &Statement,
        dimensions: &[ScoringDimension],
    ) -> Result<JudgeScore, ProviderError>;
}

/// Settings for [`OpenAiProvider`].
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    /// OpenAI-compatible API base URL.
    pub api_base: String,
    /// API key for authentication.
    pub api_key: String,
    /// Model used when a participant does not name one.
    pub default_model: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl OpenAiSettings {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            default_model: "gpt-4o-mini".to_string(),
            max_tokens: 400,
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

/// [`AiProvider`] backed by an OpenAI-compatible chat completion API.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    settings: OpenAiSettings,
}

impl OpenAiProvider {
    pub fn new(settings: OpenAiSettings) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| ProviderError::HttpClient(e.to_string()))?;

        let config = OpenAIConfig::new()
            .with_api_key(&settings.api_key)
            .with_api_base(&settings.api_base);

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
            settings,
        })
    }

    fn model_for<'a>(&'a self, participant: &'a Participant) -> &'a str {
        participant
            .model
            .as_deref()
            .unwrap_or(&self.settings.default_model)
    }

    async fn complete(
        &self,
        model: &str,
        system: String,
        user: String,
    ) -> Result<String, ProviderError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: system.into(),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: user.into(),
                name: None,
            }),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .max_completion_tokens(self.settings.max_tokens)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(content)
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    async fn generate_thoughts(
        &self,
        participant: &Participant,
        context: &TurnContext,
    ) -> Result<String, ProviderError> {
        let system = speaker_prompt(participant, &context.topic);
        let user = format!(
            "{}\n\nBefore you speak, think privately about your strategy for round {} of {}: \
             which arguments to press and which to answer. Write your inner thoughts only.",
            transcript(context),
            context.round,
            context.total_rounds
        );

        let raw = self.complete(self.model_for(participant), system, user).await?;
        non_empty(clean_reply(&raw, &participant.name))
    }

    async fn generate_formal_statement(
        &self,
        participant: &Participant,
        thoughts: &str,
        context: &TurnContext,
    ) -> Result<String, ProviderError> {
        let system = speaker_prompt(participant, &context.topic);
        let user = format!(
            "{}\n\nYour private notes for this turn:\n{}\n\nNow deliver your formal statement \
             for round {} of {}. Output only your spoken words.",
            transcript(context),
            thoughts,
            context.round,
            context.total_rounds
        );

        let raw = self.complete(self.model_for(participant), system, user).await?;
        non_empty(clean_reply(&raw, &participant.name))
    }

    async fn generate_score(
        &self,
        judge: &Participant,
        statement: &Statement,
        dimensions: &[ScoringDimension],
    ) -> Result<JudgeScore, ProviderError> {
        let rubric = dimensions
            .iter()
            .filter(|d| d.enabled)
            .map(|d| {
                format!(
                    "- {} ({}, weight {}): {} Criteria: {}",
                    d.id,
                    d.name,
                    d.weight,
                    d.description,
                    d.criteria.join("; ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let system = format!(
            "You are {}, the judge of a formal debate. {}",
            judge.name,
            judge.persona.as_deref().unwrap_or("You are fair and precise.")
        );
        let user = format!(
            "Score the following statement from round {} on each dimension from 0 to 100.\n\n\
             Dimensions:\n{}\n\nStatement:\n{}\n\n\
             Reply with a single JSON object: {{\"dimensions\": {{\"<id>\": <score>, ...}}, \
             \"totalScore\": <weighted total>, \"comment\": \"...\", \
             \"feedback\": {{\"strengths\": [], \"weaknesses\": [], \"suggestions\": []}}}}",
            statement.round, rubric, statement.content
        );

        let raw = self.complete(self.model_for(judge), system, user).await?;
        parse_judge_score(&raw)
    }
}

fn speaker_prompt(participant: &Participant, topic: &Topic) -> String {
    let side = if participant.role.is_affirmative() {
        "You argue IN FAVOR of the topic."
    } else if participant.role.is_negative() {
        "You argue AGAINST the topic."
    } else {
        "You may take whichever position you find most convincing."
    };

    format!(
        "You are {} participating in a formal debate.\n\nTOPIC: {}\n{}\n\n{}\n{}\n\n\
         Be persuasive and professional, engage with earlier speakers, and do not break \
         character or acknowledge being an AI.",
        participant.display_name_with_role(),
        topic.title,
        topic.description,
        side,
        participant.persona.as_deref().unwrap_or("")
    )
}

fn transcript(context: &TurnContext) -> String {
    if context.prior_statements.is_empty() {
        return "No one has spoken yet.".to_string();
    }
    let lines: Vec<String> = context
        .prior_statements
        .iter()
        .map(|s| format!("[Round {}, {}]: {}", s.round, s.participant_id, s.content))
        .collect();
    format!("Debate so far:\n{}", lines.join("\n"))
}

fn non_empty(text: String) -> Result<String, ProviderError> {
    if text.is_empty() {
        Err(ProviderError::EmptyResponse)
    } else {
        Ok(text)
    }
}

/// Extract and validate the JSON score object from a judge reply.
pub fn parse_judge_score(reply: &str) -> Result<JudgeScore, ProviderError> {
    let object = JSON_OBJECT
        .find(reply)
        .map(|m| m.as_str())
        .ok_or_else(|| ProviderError::MalformedResponse("no JSON object in judge reply".into()))?;

    let mut score: JudgeScore = serde_json::from_str(object)
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid score JSON: {}", e)))?;

    if score.dimensions.is_empty() {
        return Err(ProviderError::MalformedResponse(
            "judge reply has no dimension scores".into(),
        ));
    }
    if !score.total_score.is_finite() {
        return Err(ProviderError::MalformedResponse(
            "judge total score is not a number".into(),
        ));
    }
    score.total_score = score.total_score.clamp(0.0, 100.0);
    Ok(score)
}

/// Tags whose whole block is private model reasoning.
const REASONING_TAGS: [&str; 11] = [
    "thinking",
    "think",
    "reflection",
    "reflect",
    "internal",
    "reasoning",
    "thought",
    "scratch",
    "scratchpad",
    "plan",
    "analysis",
];

static REASONING_BLOCKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    REASONING_TAGS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}>")).expect("valid regex"))
        .collect()
});
static STRAY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?\w+[^>]*>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Turn a raw completion into the text a speaker actually says.
///
/// Drops reasoning blocks and stray tags, markdown emphasis, and a leading
/// `Name:` or `Name (ROLE):` label the model sometimes adds for itself.
pub fn clean_reply(raw: &str, speaker_name: &str) -> String {
    let mut text = raw.to_string();
    for block in REASONING_BLOCKS.iter() {
        text = block.replace_all(&text, "").into_owned();
    }
    text = STRAY_TAG.replace_all(&text, "").into_owned();
    text = text.replace('*', "");
    text = WHITESPACE.replace_all(&text, " ").trim().to_string();

    strip_speaker_label(&text, speaker_name).to_string()
}

fn strip_speaker_label<'a>(text: &'a str, speaker_name: &str) -> &'a str {
    if speaker_name.is_empty() {
        return text;
    }
    let Some(rest) = text.strip_prefix(speaker_name) else {
        return text;
    };
    let rest = match rest.trim_start().strip_prefix('(') {
        Some(role) => match role.find(')') {
            Some(close) => &role[close + 1..],
            None => return text,
        },
        None => rest,
    };
    match rest.trim_start().strip_prefix(':') {
        Some(speech) => speech.trim_start(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::DebateRole;
    use crate::session::StatementKind;

    #[test]
    fn test_clean_reply_drops_reasoning_blocks() {
        let input = "<thinking>Let me think about this...</thinking>The answer is 42.";
        assert_eq!(clean_reply(input, "Avery"), "The answer is 42.");

        let input = "<plan>\nMultiple\nlines\n</plan>Final *answer* here.";
        assert_eq!(clean_reply(input, "Avery"), "Final answer here.");
    }

    #[test]
    fn test_clean_reply_drops_stray_tags() {
        let output = clean_reply(
            "Start <think>nested <inner>tags</inner> content</think> end",
            "Avery",
        );
        assert!(!output.contains('<'));
        assert!(!output.contains('>'));
    }

    #[test]
    fn test_clean_reply_strips_own_label() {
        assert_eq!(
            clean_reply("**Avery:** Tea is gentler.", "Avery"),
            "Tea is gentler."
        );
        assert_eq!(
            clean_reply("Avery (AFFIRMATIVE 1): Tea is gentler.", "Avery"),
            "Tea is gentler."
        );
        assert_eq!(
            clean_reply("Avery makes a fair point: tea.", "Avery"),
            "Avery makes a fair point: tea."
        );
        assert_eq!(
            clean_reply("Blake: coffee wins.", "Avery"),
            "Blake: coffee wins."
        );
    }

    #[test]
    fn test_parse_judge_score_with_prose() {
        let reply = r#"Here is my evaluation:
{"dimensions": {"logic": 82, "evidence": 74.5}, "totalScore": 78.9,
 "comment": "Solid.", "feedback": {"strengths": ["clear"], "weaknesses": []}}
Thanks."#;
        let score = parse_judge_score(reply).unwrap();
        assert_eq!(score.dimensions["logic"], 82.0);
        assert_eq!(score.total_score, 78.9);
        assert_eq!(score.comment, "Solid.");
        let feedback = score.feedback.unwrap();
        assert_eq!(feedback.strengths, vec!["clear"]);
        assert!(feedback.suggestions.is_empty());
    }

    #[test]
    fn test_parse_judge_score_snake_case_and_clamp() {
        let score =
            parse_judge_score(r#"{"dimensions": {"logic": 100}, "total_score": 130}"#).unwrap();
        assert_eq!(score.total_score, 100.0);
        assert!(score.comment.is_empty());
    }

    #[test]
    fn test_parse_judge_score_rejects_garbage() {
        assert!(matches!(
            parse_judge_score("I refuse to score this."),
            Err(ProviderError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_judge_score(r#"{"dimensions": {}, "totalScore": 50}"#),
            Err(ProviderError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_judge_score(r#"{"dimensions": {"logic": "high"}}"#),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_transcript_lists_prior_statements() {
        let context = TurnContext {
            topic: Topic::new("Tea beats coffee", ""),
            round: 2,
            total_rounds: 3,
            prior_statements: vec![Statement::new(
                "aff-1",
                1,
                StatementKind::FormalStatement,
                "Tea is calmer.",
            )],
        };
        let text = transcript(&context);
        assert!(text.contains("[Round 1, aff-1]: Tea is calmer."));
    }

    #[test]
    fn test_speaker_prompt_sides() {
        let topic = Topic::new("Tea beats coffee", "");
        let aff = Participant::new("a", "Ada", DebateRole::Affirmative2);
        let neg = Participant::new("n", "Ned", DebateRole::Negative1);
        assert!(speaker_prompt(&aff, &topic).contains("IN FAVOR"));
        assert!(speaker_prompt(&neg, &topic).contains("AGAINST"));
    }
}
