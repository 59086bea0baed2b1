//! Debate format definitions.
//!
//! A format decides the turn order for each round. Judges and observers
//! never appear in a turn queue.

use serde::{Deserialize, Serialize};

use crate::participant::{DebateRole, Participant};

/// Role order for a structured round led by the affirmative side.
const AFFIRMATIVE_FIRST: [DebateRole; 4] = [
    DebateRole::Affirmative1,
    DebateRole::Negative1,
    DebateRole::Affirmative2,
    DebateRole::Negative2,
];

/// Role order for a structured round led by the negative side.
const NEGATIVE_FIRST: [DebateRole; 4] = [
    DebateRole::Negative1,
    DebateRole::Affirmative1,
    DebateRole::Negative2,
    DebateRole::Affirmative2,
];

/// How speakers are ordered within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DebateFormat {
    /// Sides alternate in a fixed role order:
    /// affirmative 1, negative 1, affirmative 2, negative 2.
    /// Unassigned debaters follow in configured order.
    Structured {
        /// Even rounds are opened by the negative side.
        #[serde(default)]
        alternate_openers: bool,
    },
    /// Every eligible participant shares one rotation in configured order.
    Free {
        /// Round `n` starts `n - 1` places further along the rotation.
        #[serde(default)]
        rotate_start: bool,
    },
}

impl Default for DebateFormat {
    fn default() -> Self {
        DebateFormat::Structured {
            alternate_openers: false,
        }
    }
}

impl DebateFormat {
    /// Returns the name of this debate format.
    pub fn name(&self) -> &str {
        match self {
            DebateFormat::Structured { .. } => "structured",
            DebateFormat::Free { .. } => "free",
        }
    }

    /// Returns the display name for the format.
    pub fn display_name(&self) -> &str {
        match self {
            DebateFormat::Structured { .. } => "Structured Debate (Affirmative vs Negative)",
            DebateFormat::Free { .. } => "Free Debate (Open Rotation)",
        }
    }

    /// Participant ids in speaking order for `round` (1-indexed).
    pub fn turn_order(&self, participants: &[Participant], round: u32) -> Vec<String> {
        match *self {
            DebateFormat::Structured { alternate_openers } => {
                let roles = if alternate_openers && round % 2 == 0 {
                    NEGATIVE_FIRST
                } else {
                    AFFIRMATIVE_FIRST
                };

                let mut order: Vec<String> = roles
                    .iter()
                    .flat_map(|role| participants.iter().filter(move |p| p.role == *role))
                    .map(|p| p.id.clone())
                    .collect();
                order.extend(
                    participants
                        .iter()
                        .filter(|p| p.role == DebateRole::Unassigned)
                        .map(|p| p.id.clone()),
                );
                order
            }
            DebateFormat::Free { rotate_start } => {
                let mut order: Vec<String> = participants
                    .iter()
                    .filter(|p| p.role.is_speaker())
                    .map(|p| p.id.clone())
                    .collect();
                if rotate_start && !order.is_empty() {
                    let shift = (round.saturating_sub(1) as usize) % order.len();
                    order.rotate_left(shift);
                }
                order
            }
        }
    }
}

/// Get a debate format by name.
pub fn get_format(name: &str) -> Option<DebateFormat> {
    match name.to_lowercase().as_str() {
        "structured" => Some(DebateFormat::Structured {
            alternate_openers: false,
        }),
        "free" => Some(DebateFormat::Free { rotate_start: false }),
        _ => None,
    }
}

/// List all available debate format names.
pub fn available_formats() -> Vec<&'static str> {
    vec!["structured", "free"]
}
