//! Prompt assembly.
//!
//! Builds the full generation prompt for a turn: instructional frame, story
//! header, windowed recent state, relevant summaries, any already-resolved
//! roll, the player's input, and a closing instruction that depends on story
//! status. Everything beyond the recency windows is reachable only through
//! summaries, which keeps the prompt bounded no matter how long a story runs.

use crate::dice::DiceOutcome;
use crate::story::{Story, StoryStatus};
use crate::summary::Summarizer;

const GM_FRAME: &str = include_str!("prompts/gm_frame.txt");

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}

/// Window sizes and the overall token ceiling.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub max_events: usize,
    pub max_characters: usize,
    pub max_locations: usize,
    pub max_dice: usize,
    pub max_summaries: usize,
    pub token_ceiling: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_events: 3,
            max_characters: 3,
            max_locations: 2,
            max_dice: 2,
            max_summaries: 3,
            token_ceiling: 4000,
        }
    }
}

impl ContextConfig {
    /// Wider event window, for scene regeneration where more recent history
    /// matters.
    pub fn full() -> Self {
        Self {
            max_events: 8,
            ..Self::default()
        }
    }
}

/// Assembles the generation prompt for one turn.
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
    summarizer: Summarizer,
}

impl ContextBuilder {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            summarizer: Summarizer::new(),
        }
    }

    /// Full prompt for this turn. If the result would blow the token
    /// ceiling, a trimmed-down priority prompt is built instead.
    pub fn build(&self, story: &Story, input: &str, prior_roll: Option<&DiceOutcome>) -> String {
        let prompt = self.build_full(story, input, prior_roll);
        if estimate_tokens(&prompt) <= self.config.token_ceiling {
            return prompt;
        }
        tracing::debug!(
            story = %story.id,
            estimated = estimate_tokens(&prompt),
            ceiling = self.config.token_ceiling,
            "context over token ceiling, falling back to priority sections"
        );
        self.build_priority(story, input, prior_roll)
    }

    fn build_full(&self, story: &Story, input: &str, prior_roll: Option<&DiceOutcome>) -> String {
        let mut out = String::with_capacity(4096);
        out.push_str(GM_FRAME);
        out.push('\n');

        self.push_header(&mut out, story);
        self.push_characters(&mut out, story);
        self.push_locations(&mut out, story);
        self.push_events(&mut out, story, self.config.max_events);
        self.push_dice(&mut out, story);
        self.push_summaries(&mut out, story, input);
        self.push_prior_roll(&mut out, prior_roll);
        self.push_input(&mut out, input);
        self.push_closing(&mut out, story);
        out
    }

    /// Ceiling fallback: only the sections the generator cannot do without.
    fn build_priority(&self, story: &Story, input: &str, prior_roll: Option<&DiceOutcome>) -> String {
        let mut out = String::with_capacity(2048);
        out.push_str(GM_FRAME);
        out.push('\n');
        out.push_str(&format!(
            "CURRENT SITUATION: {}\n\n",
            story.world.current_situation
        ));
        self.push_characters(&mut out, story);
        self.push_events(&mut out, story, self.config.max_events);
        self.push_prior_roll(&mut out, prior_roll);
        self.push_input(&mut out, input);
        self.push_closing(&mut out, story);
        out
    }

    fn push_header(&self, out: &mut String, story: &Story) {
        out.push_str(&format!(
            "STORY: {} ({})\nSetting: {}\nCurrent Situation: {}\nMood: {} | Weather: {} | Time: {}\n\n",
            story.title,
            story.genre,
            story.world.setting,
            story.world.current_situation,
            story.world.mood,
            story.world.weather,
            story.world.time_of_day,
        ));
    }

    fn push_characters(&self, out: &mut String, story: &Story) {
        let characters = story.recent_characters(self.config.max_characters);
        if characters.is_empty() {
            return;
        }
        out.push_str("CHARACTERS:\n");
        for c in characters {
            out.push_str(&format!("- {}: {}", c.name, c.description));
            if !c.traits.is_empty() {
                out.push_str(&format!(" ({})", c.traits));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    fn push_locations(&self, out: &mut String, story: &Story) {
        let locations = story.recent_locations(self.config.max_locations);
        if locations.is_empty() {
            return;
        }
        out.push_str("LOCATIONS:\n");
        for l in locations {
            out.push_str(&format!("- {}: {}", l.name, l.description));
            if !l.atmosphere.is_empty() {
                out.push_str(&format!(" ({})", l.atmosphere));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    fn push_events(&self, out: &mut String, story: &Story, window: usize) {
        let events = story.recent_events(window);
        if events.is_empty() {
            return;
        }
        out.push_str("RECENT EVENTS:\n");
        for e in events {
            out.push_str(&format!("- [{}] {}\n", e.kind.name(), e.description));
        }
        out.push('\n');
    }

    fn push_dice(&self, out: &mut String, story: &Story) {
        let dice = story.recent_dice(self.config.max_dice);
        if dice.is_empty() {
            return;
        }
        out.push_str("RECENT ROLLS:\n");
        for d in dice {
            out.push_str(&format!("- {d}\n"));
        }
        out.push('\n');
    }

    fn push_summaries(&self, out: &mut String, story: &Story, input: &str) {
        let summaries = self
            .summarizer
            .relevant_summaries(story, input, self.config.max_summaries);
        if summaries.is_empty() {
            return;
        }
        out.push_str("EARLIER IN THE STORY:\n");
        for s in summaries {
            out.push_str(&format!("- {}\n", s.digest));
        }
        out.push('\n');
    }

    fn push_prior_roll(&self, out: &mut String, prior_roll: Option<&DiceOutcome>) {
        if let Some(roll) = prior_roll {
            out.push_str(&format!("DICE RESULT: {roll}\n\n"));
        }
    }

    fn push_input(&self, out: &mut String, input: &str) {
        out.push_str(&format!("PLAYER: {input}\n\n"));
    }

    fn push_closing(&self, out: &mut String, story: &Story) {
        match story.status {
            StoryStatus::Setup => out.push_str(
                "The story has not started yet. Ask the player 2-3 short questions to establish \
                 their protagonist and the world, or if they have given enough, open the first \
                 scene.",
            ),
            _ => out.push_str(
                "Advance the story based on the player's action. End at a point where the next \
                 choice is theirs.",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::{DiceOutcome, Situation};
    use crate::story::{Story, StoryEvent};
    use crate::testing::sample_story;
    use chrono::Utc;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_build_orders_sections() {
        let builder = ContextBuilder::default();
        let story = sample_story();
        let prompt = builder.build(&story, "I knock on the door", None);

        let frame = prompt.find("CRITICAL RULES").unwrap();
        let header = prompt.find("STORY: The Hollow Crown").unwrap();
        let characters = prompt.find("CHARACTERS:").unwrap();
        let events = prompt.find("RECENT EVENTS:").unwrap();
        let player = prompt.find("PLAYER: I knock on the door").unwrap();
        assert!(frame < header && header < characters && characters < events && events < player);
    }

    #[test]
    fn test_windows_omit_older_entries() {
        let builder = ContextBuilder::default();
        let mut story = sample_story();
        for i in 0..10 {
            story.record_event(StoryEvent::narrative(format!("Numbered event {i}.")));
        }

        let prompt = builder.build(&story, "look around", None);
        assert!(prompt.contains("Numbered event 9."));
        assert!(!prompt.contains("Numbered event 0."));
    }

    #[test]
    fn test_setup_and_active_closings_differ() {
        let builder = ContextBuilder::default();
        let setup = Story::new("Fresh", "Mystery");
        let active = sample_story();

        let setup_prompt = builder.build(&setup, "a noir detective story", None);
        let active_prompt = builder.build(&active, "I knock", None);
        assert!(setup_prompt.contains("2-3 short questions"));
        assert!(active_prompt.contains("Advance the story"));
        assert!(!active_prompt.contains("2-3 short questions"));
    }

    #[test]
    fn test_prior_roll_rendered() {
        let builder = ContextBuilder::default();
        let story = sample_story();
        let roll = DiceOutcome {
            situation: Situation::Stealth,
            roll: 17,
            interpretation: "Hidden".to_string(),
            timestamp: Utc::now(),
        };

        let prompt = builder.build(&story, "I sneak past", Some(&roll));
        assert!(prompt.contains("DICE RESULT: d20 (stealth) = 17 - Hidden"));
        assert!(!builder.build(&story, "I sneak past", None).contains("DICE RESULT"));
    }

    #[test]
    fn test_ceiling_triggers_priority_fallback() {
        let config = ContextConfig {
            token_ceiling: 200,
            ..ContextConfig::default()
        };
        let builder = ContextBuilder::new(config);
        let mut story = sample_story();
        story.world.setting = "x".repeat(4000);

        let prompt = builder.build(&story, "I look around", None);
        // Priority prompt drops the header, so the giant setting disappears
        // while the essentials stay.
        assert!(!prompt.contains(&story.world.setting));
        assert!(prompt.contains("CURRENT SITUATION:"));
        assert!(prompt.contains("PLAYER: I look around"));
        assert!(prompt.contains("CRITICAL RULES"));
    }

    #[test]
    fn test_prompt_stays_bounded_under_long_histories() {
        let builder = ContextBuilder::default();
        let mut story = sample_story();
        for i in 0..5000 {
            story.record_event(StoryEvent::narrative(format!("Marching event {i}.")));
        }

        let prompt = builder.build(&story, "I press on", None);
        assert!(estimate_tokens(&prompt) <= ContextConfig::default().token_ceiling);
        assert!(prompt.contains("Marching event 4999."));
        assert!(!prompt.contains("Marching event 100."));
    }

    #[test]
    fn test_full_config_widens_event_window() {
        let builder = ContextBuilder::new(ContextConfig::full());
        let mut story = sample_story();
        for i in 0..10 {
            story.record_event(StoryEvent::narrative(format!("Numbered event {i}.")));
        }

        let prompt = builder.build(&story, "look", None);
        assert!(prompt.contains("Numbered event 2."));
        assert!(!prompt.contains("Numbered event 1."));
    }
}
