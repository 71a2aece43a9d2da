//! Story state types.
//!
//! Contains everything that persists for one storytelling thread: world
//! state, the event log, characters, locations, dice history, checkpoints,
//! summaries, and play statistics.

use crate::dice::DiceOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for stories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoryId(pub Uuid);

impl StoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId(pub Uuid);

impl CheckpointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status and world state
// ============================================================================

/// Lifecycle status of a story.
///
/// `Setup` stories have not produced their opening scene yet. The
/// `Setup` -> `Active` transition is one-way; `Completed` is reached only
/// through the explicit end command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    #[default]
    Setup,
    Active,
    Completed,
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoryStatus::Setup => "setup",
            StoryStatus::Active => "active",
            StoryStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Mutable world framing used when building prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    pub setting: String,
    /// Always tracks the most recent narrative event's derived situation.
    pub current_situation: String,
    pub mood: String,
    pub weather: String,
    pub time_of_day: String,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            setting: "To be determined".to_string(),
            current_situation: "Story setup in progress".to_string(),
            mood: "neutral".to_string(),
            weather: "clear".to_string(),
            time_of_day: "morning".to_string(),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Kind of story event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Game Master narration advancing the story.
    Narrative,
    /// In-fiction speech.
    Dialogue,
    /// Out-of-fiction bookkeeping (scene resets, meta notes).
    System,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Narrative => "narrative",
            EventKind::Dialogue => "dialogue",
            EventKind::System => "system",
        }
    }
}

/// One atomic unit of story history.
///
/// At most one dice outcome rides along with an event; a turn never
/// produces two independent rolls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryEvent {
    pub kind: EventKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub dice: Option<DiceOutcome>,
}

impl StoryEvent {
    pub fn narrative(description: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Narrative,
            description: description.into(),
            timestamp: Utc::now(),
            dice: None,
        }
    }

    pub fn with_dice(mut self, dice: DiceOutcome) -> Self {
        self.dice = Some(dice);
        self
    }
}

// ============================================================================
// Characters and locations
// ============================================================================

/// Lightweight character record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub description: String,
    /// Free-text attributes (personality, relationships, state).
    #[serde(default)]
    pub traits: String,
}

impl Character {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            traits: String::new(),
        }
    }
}

/// Lightweight location record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub atmosphere: String,
}

impl Location {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            atmosphere: String::new(),
        }
    }
}

// ============================================================================
// Checkpoints
// ============================================================================

/// A named, restorable snapshot of mutable story sub-state.
///
/// The four snapshotted fields are always restored together as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub events: Vec<StoryEvent>,
    pub world: WorldState,
    pub characters: Vec<Character>,
    pub locations: Vec<Location>,
}

// ============================================================================
// Summaries
// ============================================================================

/// Relevance tier assigned to an extracted detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl Relevance {
    /// Parse a relevance word, defaulting to `Low` for anything unrecognized.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" => Relevance::High,
            "medium" => Relevance::Medium,
            _ => Relevance::Low,
        }
    }
}

/// One ranked detail extracted during compaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDetail {
    /// Detail category as emitted by the generator (character, location, ...).
    pub kind: String,
    pub name: String,
    pub description: String,
    pub relevance: Relevance,
}

/// Categorized keyword sets extracted during compaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SummaryKeywords {
    pub characters: Vec<String>,
    pub locations: Vec<String>,
    pub items: Vec<String>,
    pub concepts: Vec<String>,
    pub events: Vec<String>,
}

impl SummaryKeywords {
    /// Iterate every keyword across all categories.
    pub fn iter_all(&self) -> impl Iterator<Item = &String> {
        self.characters
            .iter()
            .chain(self.locations.iter())
            .chain(self.items.iter())
            .chain(self.concepts.iter())
            .chain(self.events.iter())
    }
}

/// A compacted digest of older history. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorySummary {
    /// Total event count at the moment this summary was produced.
    pub event_count: usize,
    pub digest: String,
    pub keywords: SummaryKeywords,
    pub details: Vec<KeyDetail>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Stats
// ============================================================================

/// Play statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryStats {
    pub interactions: u64,
    pub dice_rolls: u64,
    pub last_active: DateTime<Utc>,
}

impl Default for StoryStats {
    fn default() -> Self {
        Self {
            interactions: 0,
            dice_rolls: 0,
            last_active: Utc::now(),
        }
    }
}

// ============================================================================
// Story
// ============================================================================

/// Search hits for an `/info` query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryDetails {
    pub characters: Vec<Character>,
    pub locations: Vec<Location>,
    pub events: Vec<StoryEvent>,
}

impl StoryDetails {
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty() && self.locations.is_empty() && self.events.is_empty()
    }
}

/// One persistent storytelling thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: StoryId,
    pub title: String,
    pub genre: String,
    pub status: StoryStatus,
    pub world: WorldState,
    pub events: Vec<StoryEvent>,
    pub dice_history: Vec<DiceOutcome>,
    pub characters: Vec<Character>,
    pub locations: Vec<Location>,
    pub checkpoints: Vec<Checkpoint>,
    pub summaries: Vec<StorySummary>,
    pub stats: StoryStats,
    pub created_at: DateTime<Utc>,
}

impl Story {
    /// Create a fresh story in setup status.
    pub fn new(title: impl Into<String>, genre: impl Into<String>) -> Self {
        Self {
            id: StoryId::new(),
            title: title.into(),
            genre: genre.into(),
            status: StoryStatus::Setup,
            world: WorldState::default(),
            events: Vec::new(),
            dice_history: Vec::new(),
            characters: Vec::new(),
            locations: Vec::new(),
            checkpoints: Vec::new(),
            summaries: Vec::new(),
            stats: StoryStats::default(),
            created_at: Utc::now(),
        }
    }

    /// Append an event, recording its dice outcome in the roll history and
    /// updating play stats. This is the single mutation point for a finished
    /// turn: it runs only after all generation work has succeeded.
    pub fn record_event(&mut self, event: StoryEvent) {
        if let Some(dice) = &event.dice {
            self.dice_history.push(dice.clone());
            self.stats.dice_rolls += 1;
        }
        if event.kind == EventKind::Narrative {
            self.world.current_situation = derive_situation(&event.description);
        }
        self.events.push(event);
        self.stats.interactions += 1;
        self.stats.last_active = Utc::now();
    }

    /// Most recent `n` events, oldest first.
    pub fn recent_events(&self, n: usize) -> &[StoryEvent] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    /// Most recent `n` dice outcomes, oldest first.
    pub fn recent_dice(&self, n: usize) -> &[DiceOutcome] {
        let start = self.dice_history.len().saturating_sub(n);
        &self.dice_history[start..]
    }

    /// Most recent `n` characters, oldest first.
    pub fn recent_characters(&self, n: usize) -> &[Character] {
        let start = self.characters.len().saturating_sub(n);
        &self.characters[start..]
    }

    /// Most recent `n` locations, oldest first.
    pub fn recent_locations(&self, n: usize) -> &[Location] {
        let start = self.locations.len().saturating_sub(n);
        &self.locations[start..]
    }

    /// Case-insensitive exact lookup by character name.
    pub fn find_character(&self, name: &str) -> Option<&Character> {
        self.characters
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Add a character, or merge details into an existing one of the same
    /// name. Empty incoming fields leave the existing values untouched.
    pub fn upsert_character(&mut self, incoming: Character) {
        if let Some(existing) = self
            .characters
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(&incoming.name))
        {
            if !incoming.description.is_empty() {
                existing.description = incoming.description;
            }
            if !incoming.traits.is_empty() {
                existing.traits = incoming.traits;
            }
        } else {
            self.characters.push(incoming);
        }
    }

    /// Add a location, or merge details into an existing one of the same name.
    pub fn upsert_location(&mut self, incoming: Location) {
        if let Some(existing) = self
            .locations
            .iter_mut()
            .find(|l| l.name.eq_ignore_ascii_case(&incoming.name))
        {
            if !incoming.description.is_empty() {
                existing.description = incoming.description;
            }
            if !incoming.atmosphere.is_empty() {
                existing.atmosphere = incoming.atmosphere;
            }
        } else {
            self.locations.push(incoming);
        }
    }

    /// Case-insensitive substring search across characters, locations and
    /// event descriptions, for the `/info` command.
    pub fn search(&self, query: &str) -> StoryDetails {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return StoryDetails::default();
        }

        StoryDetails {
            characters: self
                .characters
                .iter()
                .filter(|c| {
                    c.name.to_lowercase().contains(&needle)
                        || c.description.to_lowercase().contains(&needle)
                })
                .cloned()
                .collect(),
            locations: self
                .locations
                .iter()
                .filter(|l| {
                    l.name.to_lowercase().contains(&needle)
                        || l.description.to_lowercase().contains(&needle)
                })
                .cloned()
                .collect(),
            events: self
                .events
                .iter()
                .filter(|e| e.description.to_lowercase().contains(&needle))
                .cloned()
                .collect(),
        }
    }

    /// The most recent dice outcome, if any roll has happened.
    pub fn last_roll(&self) -> Option<&DiceOutcome> {
        self.dice_history.last()
    }
}

/// Derive a short situation line from narrative text: its first sentence.
pub fn derive_situation(narrative: &str) -> String {
    let trimmed = narrative.trim();
    match trimmed.split_terminator(['.', '!', '?']).next() {
        Some(first) if !first.trim().is_empty() => first.trim().to_string(),
        _ => "Story continues".to_string(),
    }
}
