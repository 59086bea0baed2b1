//! Score records, weighted dimensions and the aggregation over them.
//!
//! [`statistics`] and [`rankings`] are pure: they never mutate their input
//! and always give the same answer for the same records.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DebateError;
use crate::participant::Participant;
use crate::session::Statement;

/// Judge id recorded on scores produced by [`mock_score`].
pub const FALLBACK_JUDGE_ID: &str = "fallback-judge";

/// Dimensions and weights used by the fallback scorer.
const FALLBACK_WEIGHTS: [(&str, f64); 4] = [
    ("logic", 0.3),
    ("evidence", 0.3),
    ("delivery", 0.2),
    ("rebuttal", 0.2),
];

/// Labels of the five distribution buckets, lowest first.
pub const SCORE_BANDS: [&str; 5] = ["0-59", "60-69", "70-79", "80-89", "90-100"];

/// One weighted axis a judge scores along.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringDimension {
    pub id: String,
    pub name: String,
    /// Relative weight, 0-100. Active weights should sum to 100.
    pub weight: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ScoringDimension {
    pub fn new(id: impl Into<String>, name: impl Into<String>, weight: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            weight,
            description: String::new(),
            criteria: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_criteria(mut self, criteria: &[&str]) -> Self {
        self.criteria = criteria.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// The stock four-dimension rubric.
pub fn default_dimensions() -> Vec<ScoringDimension> {
    vec![
        ScoringDimension::new("logic", "Logic", 30)
            .with_description("Soundness and coherence of the argument.")
            .with_criteria(&["Clear claims", "Valid reasoning", "No contradictions"]),
        ScoringDimension::new("evidence", "Evidence", 30)
            .with_description("Quality and relevance of supporting material.")
            .with_criteria(&["Relevant facts", "Credible sources", "Concrete examples"]),
        ScoringDimension::new("delivery", "Delivery", 20)
            .with_description("Clarity and persuasiveness of the speech.")
            .with_criteria(&["Clear structure", "Persuasive language"]),
        ScoringDimension::new("rebuttal", "Rebuttal", 20)
            .with_description("Engagement with the opposing side.")
            .with_criteria(&["Addresses opponents", "Exposes weaknesses"]),
    ]
}

/// Check that the weights of enabled dimensions sum to 100.
///
/// Weights are never normalized; a bad sum is reported to the caller.
pub fn check_weights(dimensions: &[ScoringDimension]) -> Result<(), DebateError> {
    let total = dimensions
        .iter()
        .filter(|d| d.enabled)
        .fold(0u32, |sum, d| sum.saturating_add(d.weight));
    if total == 100 {
        Ok(())
    } else {
        Err(DebateError::MalformedScoreWeights { total })
    }
}

/// Qualitative feedback attached to a score.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreFeedback {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// One judge's evaluation of one statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRecord {
    pub id: String,
    pub judge_id: String,
    /// The participant who made the statement.
    pub participant_id: String,
    pub statement_id: String,
    pub round: u32,
    pub dimensions: BTreeMap<String, f64>,
    pub total_score: f64,
    pub comment: String,
    #[serde(default)]
    pub feedback: Option<ScoreFeedback>,
}

impl ScoreRecord {
    /// Whether this record came from the fallback scorer.
    pub fn is_fallback(&self) -> bool {
        self.judge_id == FALLBACK_JUDGE_ID
    }
}

/// Synthesize a score for `statement` when the judge cannot be reached.
///
/// Each fallback dimension gets an integer value in 75..=90, drawn from a
/// generator seeded by the statement id.
pub fn mock_score(statement: &Statement) -> ScoreRecord {
    let mut rng = StdRng::seed_from_u64(fallback_seed(&statement.id));

    let mut dimensions = BTreeMap::new();
    let mut total_score = 0.0;
    for (name, weight) in FALLBACK_WEIGHTS {
        let value = f64::from(rng.random_range(75u32..=90));
        total_score += value * weight;
        dimensions.insert(name.to_string(), value);
    }

    ScoreRecord {
        id: Uuid::new_v4().to_string(),
        judge_id: FALLBACK_JUDGE_ID.to_string(),
        participant_id: statement.participant_id.clone(),
        statement_id: statement.id.clone(),
        round: statement.round,
        dimensions,
        total_score,
        comment: "Automatic evaluation generated because the judge was unavailable.".to_string(),
        feedback: None,
    }
}

/// Seed for the fallback generator: the high half of a UUID id, or an
/// FNV-1a hash of any other id.
fn fallback_seed(statement_id: &str) -> u64 {
    Uuid::parse_str(statement_id)
        .map(|id| id.as_u64_pair().0)
        .unwrap_or_else(|_| {
            statement_id.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
                (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
            })
        })
}

/// Counts of scores per band of [`SCORE_BANDS`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreDistribution {
    pub buckets: [u32; 5],
}

impl ScoreDistribution {
    fn record(&mut self, value: f64) {
        let index = match value {
            v if v < 60.0 => 0,
            v if v < 70.0 => 1,
            v if v < 80.0 => 2,
            v if v < 90.0 => 3,
            _ => 4,
        };
        self.buckets[index] += 1;
    }

    /// `(label, count)` pairs, lowest band first.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u32)> + '_ {
        SCORE_BANDS.iter().copied().zip(self.buckets.iter().copied())
    }

    pub fn total(&self) -> u32 {
        self.buckets.iter().sum()
    }
}

/// Average, extremes and distribution of a set of scores.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreSummary {
    pub average: f64,
    pub highest: f64,
    pub lowest: f64,
    pub count: usize,
    pub distribution: ScoreDistribution,
}

impl ScoreSummary {
    /// Summarize `(value, total_score)` pairs. Average and extremes are taken
    /// over the values; the distribution buckets the record totals.
    fn from_scores(scores: &[(f64, f64)]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }

        let mut distribution = ScoreDistribution::default();
        let mut sum = 0.0;
        let mut highest = f64::NEG_INFINITY;
        let mut lowest = f64::INFINITY;
        for &(value, total) in scores {
            sum += value;
            highest = highest.max(value);
            lowest = lowest.min(value);
            distribution.record(total);
        }

        Self {
            average: sum / scores.len() as f64,
            highest,
            lowest,
            count: scores.len(),
            distribution,
        }
    }
}

/// Aggregate figures over a set of score records.
///
/// Every distribution, including the per-dimension ones, counts record
/// total scores.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Statistics {
    /// Computed over each record's total score.
    pub overall: ScoreSummary,
    /// Keyed by every dimension observed in any record.
    pub dimensions: BTreeMap<String, ScoreSummary>,
}

/// A participant's position in the final standings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedEntry {
    /// 1-based position after sorting.
    pub rank: usize,
    pub participant_id: String,
    pub participant_name: String,
    /// Sum of the participant's total scores.
    pub total_score: f64,
    /// Mean of the participant's total scores.
    pub average_score: f64,
    pub dimension_averages: BTreeMap<String, f64>,
    pub statement_count: usize,
}

pub fn statistics(records: &[ScoreRecord]) -> Statistics {
    if records.is_empty() {
        return Statistics::default();
    }

    let totals: Vec<(f64, f64)> = records
        .iter()
        .map(|r| (r.total_score, r.total_score))
        .collect();

    let mut per_dimension: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();
    for record in records {
        for (name, &value) in &record.dimensions {
            per_dimension
                .entry(name.as_str())
                .or_default()
                .push((value, record.total_score));
        }
    }

    Statistics {
        overall: ScoreSummary::from_scores(&totals),
        dimensions: per_dimension
            .into_iter()
            .map(|(name, scores)| (name.to_string(), ScoreSummary::from_scores(&scores)))
            .collect(),
    }
}

/// Rank participants by summed total score, highest first.
///
/// Participants with equal sums keep the order in which they first appear
/// in `records`.
pub fn rankings(records: &[ScoreRecord], participants: &[Participant]) -> Vec<RankedEntry> {
    struct Tally<'a> {
        participant_id: &'a str,
        total: f64,
        count: usize,
        dimensions: BTreeMap<&'a str, (f64, usize)>,
    }

    let mut tallies: Vec<Tally<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        let slot = *index.entry(record.participant_id.as_str()).or_insert_with(|| {
            tallies.push(Tally {
                participant_id: record.participant_id.as_str(),
                total: 0.0,
                count: 0,
                dimensions: BTreeMap::new(),
            });
            tallies.len() - 1
        });

        let tally = &mut tallies[slot];
        tally.total += record.total_score;
        tally.count += 1;
        for (name, &value) in &record.dimensions {
            let entry = tally.dimensions.entry(name.as_str()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }

    let mut entries: Vec<RankedEntry> = tallies
        .into_iter()
        .map(|tally| {
            let participant_name = participants
                .iter()
                .find(|p| p.id == tally.participant_id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| tally.participant_id.to_string());

            RankedEntry {
                rank: 0,
                participant_id: tally.participant_id.to_string(),
                participant_name,
                total_score: tally.total,
                average_score: tally.total / tally.count as f64,
                dimension_averages: tally
                    .dimensions
                    .into_iter()
                    .map(|(name, (sum, count))| (name.to_string(), sum / count as f64))
                    .collect(),
                statement_count: tally.count,
            }
        })
        .collect();

    // `sort_by` is stable, which keeps ties in first-appearance order.
    entries.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
    for (position, entry) in entries.iter_mut().enumerate() {
        entry.rank = position + 1;
    }
    entries
}
