//! Situation-based dice resolution.
//!
//! Every roll draws a single d20 uniformly from 1..=20 and maps it through
//! interpretation bands chosen by the situation. Naturals 1 and 20 always
//! carry situation-specific critical text distinct from the mid-range bands.
//!
//! Band thresholds per situation:
//! - combat:        <=10 miss, >=11 hit
//! - persuasion:    <=8 failure, 9-15 partial success, >=16 success
//! - stealth:       <=10 detected, >=11 hidden
//! - investigation: <=8 nothing found, 9-15 minor clue, >=16 major discovery
//! - survival:      <=10 struggle, >=11 manage
//! - unspecified:   <=8 failure-leaning, 9-15 middling, >=16 success-leaning

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of story situations a roll can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Situation {
    Combat,
    Persuasion,
    Stealth,
    Investigation,
    Survival,
    /// Fallback for rolls with no recognizable situation; plain d20 banding.
    #[default]
    Unspecified,
}

impl Situation {
    pub fn name(&self) -> &'static str {
        match self {
            Situation::Combat => "combat",
            Situation::Persuasion => "persuasion",
            Situation::Stealth => "stealth",
            Situation::Investigation => "investigation",
            Situation::Survival => "survival",
            Situation::Unspecified => "unspecified",
        }
    }

    pub fn all() -> [Situation; 6] {
        [
            Situation::Combat,
            Situation::Persuasion,
            Situation::Stealth,
            Situation::Investigation,
            Situation::Survival,
            Situation::Unspecified,
        ]
    }

    /// Map a free-text situation tag onto the closed set.
    ///
    /// Used to normalize tags arriving from generator directives. Anything
    /// that matches no known cue falls back to `Investigation`, the most
    /// neutral "find out what happens" situation.
    pub fn normalize(tag: &str) -> Situation {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            return Situation::Investigation;
        }
        for situation in Situation::all() {
            if tag == situation.name() {
                return situation;
            }
        }
        Situation::detect(&tag).unwrap_or(Situation::Investigation)
    }

    /// Lexically classify player input for uncertainty-implying verbs.
    ///
    /// Returns `None` when the input suggests no roll at all. Cue words that
    /// imply chance without a specific situation (crafting, spellcasting)
    /// map to `Unspecified`.
    pub fn detect(input: &str) -> Option<Situation> {
        let input = input.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| input.contains(w));

        if has(&["attack", "fight", "combat", "battle", "strike", "shoot", "stab"]) {
            Some(Situation::Combat)
        } else if has(&["persuade", "convince", "negotiate", "bargain", "bribe"]) {
            Some(Situation::Persuasion)
        } else if has(&["sneak", "stealth", "hide", "conceal"]) {
            Some(Situation::Stealth)
        } else if has(&["investigate", "search", "examine", "inspect"]) {
            Some(Situation::Investigation)
        } else if has(&["survive", "navigate", "forage", "track"]) {
            Some(Situation::Survival)
        } else if has(&["repair", "craft", "cast", "spell", "ritual"]) {
            Some(Situation::Unspecified)
        } else {
            None
        }
    }
}

impl fmt::Display for Situation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The resolved outcome of one situation roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceOutcome {
    pub situation: Situation,
    /// Raw d20 value in 1..=20.
    pub roll: u8,
    pub interpretation: String,
    pub timestamp: DateTime<Utc>,
}

impl DiceOutcome {
    pub fn is_critical_success(&self) -> bool {
        self.roll == 20
    }

    pub fn is_critical_failure(&self) -> bool {
        self.roll == 1
    }
}

impl fmt::Display for DiceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "d20 ({}) = {} - {}",
            self.situation, self.roll, self.interpretation
        )
    }
}

/// Roll a d20 for a situation using the thread-local random source.
///
/// Each call draws fresh entropy; callers must never reuse a prior outcome
/// for a new roll.
pub fn roll_for_situation(situation: Situation) -> DiceOutcome {
    roll_for_situation_with_rng(situation, &mut rand::thread_rng())
}

/// Roll with a caller-supplied RNG (seedable in tests).
pub fn roll_for_situation_with_rng<R: Rng>(situation: Situation, rng: &mut R) -> DiceOutcome {
    let roll = rng.gen_range(1..=20u8);
    DiceOutcome {
        situation,
        roll,
        interpretation: interpret(situation, roll).to_string(),
        timestamp: Utc::now(),
    }
}

/// Band a d20 value for a situation. Total over 1..=20; never panics.
pub fn interpret(situation: Situation, roll: u8) -> &'static str {
    match situation {
        Situation::Combat => match roll {
            1 => "Critical miss - you stumble and leave yourself open",
            20 => "Critical hit - a devastating blow",
            2..=10 => "Miss",
            _ => "Hit",
        },
        Situation::Persuasion => match roll {
            1 => "Critical failure - they turn hostile",
            20 => "Critical success - they are completely convinced",
            2..=8 => "Failure",
            9..=15 => "Partial success",
            _ => "Success",
        },
        Situation::Stealth => match roll {
            1 => "Critical failure - you make a loud noise",
            20 => "Critical success - completely undetected",
            2..=10 => "Detected",
            _ => "Hidden",
        },
        Situation::Investigation => match roll {
            1 => "Critical failure - you find false information",
            20 => "Critical success - you uncover a crucial clue",
            2..=8 => "Nothing found",
            9..=15 => "Minor clue",
            _ => "Important discovery",
        },
        Situation::Survival => match roll {
            1 => "Critical failure - you get lost",
            20 => "Critical success - you find the perfect path",
            2..=10 => "Struggle",
            _ => "Manage",
        },
        Situation::Unspecified => match roll {
            1 => "Critical failure - something goes terribly wrong",
            20 => "Critical success - a perfect outcome",
            2..=8 => "Things go badly",
            9..=15 => "A mixed outcome",
            _ => "Things go well",
        },
    }
}
