//! Checkpoint snapshots.
//!
//! A checkpoint deep-copies the four mutable narrative fields (events, world
//! state, characters, locations) so a restore can replace them wholesale as
//! one unit. Checkpoints are created and restored only by explicit player
//! commands; nothing expires them automatically.

use crate::story::{Checkpoint, CheckpointId, Story};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from checkpoint operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoints exist for this story")]
    NoCheckpoints,

    #[error("no checkpoint matches '{selector}'; available: {}", format_available(.available))]
    NotFound {
        selector: String,
        available: Vec<CheckpointInfo>,
    },
}

fn format_available(available: &[CheckpointInfo]) -> String {
    if available.is_empty() {
        return "none".to_string();
    }
    available
        .iter()
        .map(|info| info.label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Listing entry: identity and shape only, not the snapshot payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub id: CheckpointId,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub event_count: usize,
}

impl From<&Checkpoint> for CheckpointInfo {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            id: checkpoint.id,
            label: checkpoint.label.clone(),
            created_at: checkpoint.created_at,
            event_count: checkpoint.events.len(),
        }
    }
}

/// Snapshot the story's restorable state under a label.
///
/// An empty label gets a positional default ("checkpoint-3").
pub fn create(story: &mut Story, label: Option<&str>) -> CheckpointInfo {
    let label = match label.map(str::trim) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => format!("checkpoint-{}", story.checkpoints.len() + 1),
    };

    let checkpoint = Checkpoint {
        id: CheckpointId::new(),
        label,
        created_at: Utc::now(),
        events: story.events.clone(),
        world: story.world.clone(),
        characters: story.characters.clone(),
        locations: story.locations.clone(),
    };
    let info = CheckpointInfo::from(&checkpoint);
    story.checkpoints.push(checkpoint);
    info
}

/// Restore a checkpoint, replacing events/world/characters/locations
/// wholesale.
///
/// Selector resolution: `None` restores the most recently created
/// checkpoint; otherwise exact id match first, then case-insensitive label
/// substring. A miss returns `NotFound` listing everything available.
/// Restoring does not consume the checkpoint.
pub fn restore(story: &mut Story, selector: Option<&str>) -> Result<CheckpointInfo, CheckpointError> {
    if story.checkpoints.is_empty() {
        return Err(CheckpointError::NoCheckpoints);
    }

    let index = match selector.map(str::trim).filter(|s| !s.is_empty()) {
        None => story.checkpoints.len() - 1,
        Some(selector) => find_checkpoint(story, selector).ok_or_else(|| {
            CheckpointError::NotFound {
                selector: selector.to_string(),
                available: list(story),
            }
        })?,
    };

    let checkpoint = story.checkpoints[index].clone();
    story.events = checkpoint.events;
    story.world = checkpoint.world;
    story.characters = checkpoint.characters;
    story.locations = checkpoint.locations;
    story.stats.last_active = Utc::now();

    Ok(CheckpointInfo::from(&story.checkpoints[index]))
}

/// List checkpoints oldest first, identity fields only.
pub fn list(story: &Story) -> Vec<CheckpointInfo> {
    story.checkpoints.iter().map(CheckpointInfo::from).collect()
}

fn find_checkpoint(story: &Story, selector: &str) -> Option<usize> {
    // Exact id match wins.
    if let Some(index) = story
        .checkpoints
        .iter()
        .position(|c| c.id.to_string() == selector)
    {
        return Some(index);
    }
    // Otherwise the newest checkpoint whose label contains the selector.
    let needle = selector.to_lowercase();
    story
        .checkpoints
        .iter()
        .rposition(|c| c.label.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::{Character, StoryEvent};
    use crate::testing::sample_story;

    #[test]
    fn test_round_trip_restores_pre_mutation_state() {
        let mut story = sample_story();
        let info = create(&mut story, Some("journal-1"));

        let events_before = story.events.clone();
        let world_before = story.world.clone();
        let characters_before = story.characters.clone();
        let locations_before = story.locations.clone();

        story.record_event(StoryEvent::narrative("Everything goes wrong. Fire spreads."));
        story.upsert_character(Character::new("Intruder", "Appeared after the snapshot"));
        story.world.mood = "chaotic".to_string();

        let restored = restore(&mut story, Some(&info.id.to_string())).unwrap();
        assert_eq!(restored.id, info.id);
        assert_eq!(story.events, events_before);
        assert_eq!(story.world, world_before);
        assert_eq!(story.characters, characters_before);
        assert_eq!(story.locations, locations_before);
    }

    #[test]
    fn test_restore_without_selector_uses_newest() {
        let mut story = sample_story();
        create(&mut story, Some("first"));
        story.record_event(StoryEvent::narrative("Later."));
        let second = create(&mut story, Some("second"));

        let restored = restore(&mut story, None).unwrap();
        assert_eq!(restored.id, second.id);
    }

    #[test]
    fn test_restore_by_label_substring_case_insensitive() {
        let mut story = sample_story();
        create(&mut story, Some("Before The Bridge"));

        let restored = restore(&mut story, Some("bridge")).unwrap();
        assert_eq!(restored.label, "Before The Bridge");
    }

    #[test]
    fn test_restore_with_no_checkpoints() {
        let mut story = sample_story();
        assert!(matches!(
            restore(&mut story, None),
            Err(CheckpointError::NoCheckpoints)
        ));
    }

    #[test]
    fn test_not_found_lists_available() {
        let mut story = sample_story();
        create(&mut story, Some("alpha"));
        create(&mut story, Some("beta"));

        match restore(&mut story, Some("gamma")) {
            Err(CheckpointError::NotFound { available, .. }) => {
                assert_eq!(available.len(), 2);
                assert_eq!(available[0].label, "alpha");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_default_label_is_positional() {
        let mut story = sample_story();
        let info = create(&mut story, None);
        assert_eq!(info.label, "checkpoint-1");
        let info = create(&mut story, Some("   "));
        assert_eq!(info.label, "checkpoint-2");
    }

    #[test]
    fn test_list_reports_event_counts_only() {
        let mut story = sample_story();
        create(&mut story, Some("a"));
        let listed = list(&story);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].event_count, story.events.len());
    }

    #[test]
    fn test_restore_keeps_checkpoint_for_reuse() {
        let mut story = sample_story();
        create(&mut story, Some("keep"));
        restore(&mut story, Some("keep")).unwrap();
        assert_eq!(story.checkpoints.len(), 1);
        assert!(restore(&mut story, Some("keep")).is_ok());
    }
}
