//! Turn processing.
//!
//! `GameMaster` is the single entry point for advancing a story: it
//! classifies input, runs the narrative pipeline (compaction, prompt
//! assembly, generation, roll resolution) or dispatches a command, and
//! applies all story mutation at the end. A turn that fails mid-pipeline
//! leaves the story as it found it, with one documented exception: summaries
//! produced by compaction stick, since they are retrieval state rather than
//! narrative state.

use crate::checkpoint::{self, CheckpointError, CheckpointInfo};
use crate::command::{Command, PlayerInput, SUPPORTED_COMMANDS};
use crate::context::{ContextBuilder, ContextConfig};
use crate::dice::{self, DiceOutcome, Situation};
use crate::generate::{GenerationConfig, GenerationError, GenerationService};
use crate::protocol::{self, RollProtocol};
use crate::story::{Character, Story, StoryDetails, StoryEvent, StoryStats, StoryStatus};
use crate::summary::Summarizer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use thiserror::Error;

const TIMEOUT_FRAME: &str = include_str!("prompts/timeout.txt");

/// Errors from processing one turn. Only infrastructure failures land here;
/// player-visible misses (unknown command, bad checkpoint selector) are
/// structured outcomes.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// What a turn produced.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// A setup-phase exchange; `now_active` marks the transition into play.
    SetupAdvanced { text: String, now_active: bool },
    /// A narrative beat, with the roll that resolved during it, if any.
    Narrative {
        text: String,
        dice: Option<DiceOutcome>,
    },
    Command(CommandOutcome),
}

/// Result payloads for slash commands.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    CheckpointCreated(CheckpointInfo),
    CheckpointRestored(CheckpointInfo),
    /// `/back` with a selector matching nothing; lists what exists.
    CheckpointNotFound {
        selector: String,
        available: Vec<CheckpointInfo>,
    },
    /// `/back` before any checkpoint was created.
    NoCheckpoints,
    Checkpoints(Vec<CheckpointInfo>),
    CharacterList(Vec<Character>),
    /// `character` is `None` when no record matches the requested name.
    CharacterInfo {
        name: String,
        character: Option<Character>,
    },
    Info {
        query: String,
        matches: StoryDetails,
    },
    Timeout {
        text: String,
    },
    SceneReset {
        text: String,
    },
    Ended {
        stats: StoryStats,
    },
    Unknown {
        name: String,
        supported: &'static [&'static str],
    },
}

/// Orchestrates a full turn against one story.
pub struct GameMaster {
    generation: Arc<dyn GenerationService>,
    context: ContextBuilder,
    summarizer: Summarizer,
    protocol: RollProtocol,
}

impl GameMaster {
    pub fn new(generation: Arc<dyn GenerationService>) -> Self {
        Self {
            generation,
            context: ContextBuilder::default(),
            summarizer: Summarizer::new(),
            protocol: RollProtocol,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// The setup-phase opening exchange for a brand-new story. Generates
    /// clarifying questions (or a scene, if the premise is rich enough)
    /// without mutating the story.
    pub async fn open_exchange(&self, story: &Story, prompt: &str) -> Result<String, TurnError> {
        let full = self.context.build(story, prompt, None);
        let response = self
            .generation
            .generate(&full, &GenerationConfig::narrative())
            .await?;
        Ok(protocol::scrub(&response))
    }

    /// Process one turn of raw player input.
    pub async fn process_turn(
        &self,
        story: &mut Story,
        raw_input: &str,
    ) -> Result<TurnOutcome, TurnError> {
        self.process_turn_with_rng(story, raw_input, &mut StdRng::from_entropy())
            .await
    }

    /// Turn processing with a caller-supplied RNG (seedable in tests).
    pub async fn process_turn_with_rng<R: Rng + Send>(
        &self,
        story: &mut Story,
        raw_input: &str,
        rng: &mut R,
    ) -> Result<TurnOutcome, TurnError> {
        match PlayerInput::parse(raw_input) {
            PlayerInput::Command(command) => self.dispatch_command(story, command).await,
            PlayerInput::FreeText(text) => match story.status {
                StoryStatus::Setup => self.setup_turn(story, &text).await,
                // Completed stories still take narrative turns; /end marks
                // an ending, it does not lock the thread.
                StoryStatus::Active | StoryStatus::Completed => {
                    self.narrative_turn(story, &text, rng).await
                }
            },
        }
    }

    /// First free-text exchange: generate the opening scene and activate.
    async fn setup_turn(&self, story: &mut Story, input: &str) -> Result<TurnOutcome, TurnError> {
        let prompt = self.context.build(story, input, None);
        let response = self
            .generation
            .generate(&prompt, &GenerationConfig::narrative())
            .await?;
        let text = protocol::scrub(&response);

        story.status = StoryStatus::Active;
        story.record_event(StoryEvent::narrative(text.clone()));
        Ok(TurnOutcome::SetupAdvanced {
            text,
            now_active: true,
        })
    }

    async fn narrative_turn<R: Rng + Send>(
        &self,
        story: &mut Story,
        input: &str,
        rng: &mut R,
    ) -> Result<TurnOutcome, TurnError> {
        // Compaction runs before prompt assembly so a due summary is
        // available as context. Its result sticks even if the turn fails.
        if self.summarizer.should_compact(story) {
            if let Some(summary) = self.summarizer.compact(story, self.generation.as_ref()).await? {
                self.summarizer.apply(story, summary);
            }
        }

        // A lexical cue in the player's input rolls before generation; the
        // generator then narrates an already-resolved outcome and any
        // directive it emits anyway is stripped, not honored. One roll per
        // turn, always.
        let pre_roll = Situation::detect(input).map(|s| dice::roll_for_situation_with_rng(s, rng));

        let prompt = self.context.build(story, input, pre_roll.as_ref());
        let response = self
            .generation
            .generate(&prompt, &GenerationConfig::narrative())
            .await?;

        let (text, dice) = match pre_roll {
            Some(outcome) => (protocol::scrub(&response), Some(outcome)),
            None => {
                self.protocol
                    .process(
                        response,
                        input,
                        story,
                        &self.context,
                        self.generation.as_ref(),
                        rng,
                    )
                    .await
            }
        };

        let mut event = StoryEvent::narrative(text.clone());
        if let Some(outcome) = dice.clone() {
            event = event.with_dice(outcome);
        }
        story.record_event(event);
        Ok(TurnOutcome::Narrative { text, dice })
    }

    async fn dispatch_command(
        &self,
        story: &mut Story,
        command: Command,
    ) -> Result<TurnOutcome, TurnError> {
        let outcome = match command {
            Command::Checkpoint { label } => {
                let info = checkpoint::create(story, label.as_deref());
                CommandOutcome::CheckpointCreated(info)
            }
            Command::Back { selector } => {
                match checkpoint::restore(story, selector.as_deref()) {
                    Ok(info) => CommandOutcome::CheckpointRestored(info),
                    Err(CheckpointError::NoCheckpoints) => CommandOutcome::NoCheckpoints,
                    Err(CheckpointError::NotFound {
                        selector,
                        available,
                    }) => CommandOutcome::CheckpointNotFound {
                        selector,
                        available,
                    },
                }
            }
            Command::ListCheckpoints => CommandOutcome::Checkpoints(checkpoint::list(story)),
            Command::Character { name: None } => {
                CommandOutcome::CharacterList(story.characters.clone())
            }
            Command::Character { name: Some(name) } => CommandOutcome::CharacterInfo {
                character: story.find_character(&name).cloned(),
                name,
            },
            Command::Info { query } => {
                let query = query.unwrap_or_default();
                CommandOutcome::Info {
                    matches: story.search(&query),
                    query,
                }
            }
            Command::Timeout { topic } => {
                let text = self.timeout_discussion(story, topic.as_deref()).await?;
                CommandOutcome::Timeout { text }
            }
            Command::ResetScene => {
                let text = self.reset_scene(story).await?;
                CommandOutcome::SceneReset { text }
            }
            Command::End => {
                story.status = StoryStatus::Completed;
                story.stats.last_active = chrono::Utc::now();
                CommandOutcome::Ended {
                    stats: story.stats.clone(),
                }
            }
            Command::Unknown { name } => CommandOutcome::Unknown {
                name,
                supported: SUPPORTED_COMMANDS,
            },
        };
        Ok(TurnOutcome::Command(outcome))
    }

    /// Out-of-story meta discussion. Leaves the story untouched.
    async fn timeout_discussion(
        &self,
        story: &Story,
        topic: Option<&str>,
    ) -> Result<String, TurnError> {
        let mut prompt = format!(
            "{TIMEOUT_FRAME}\nStory so far: {} ({}), currently: {}\n",
            story.title, story.genre, story.world.current_situation
        );
        match topic {
            Some(topic) => prompt.push_str(&format!("Discussion topic: {topic}\n")),
            None => prompt.push_str("Discussion topic: (none given)\n"),
        }
        let response = self
            .generation
            .generate(&prompt, &GenerationConfig::narrative())
            .await?;
        Ok(protocol::scrub(&response))
    }

    /// Regenerate the current scene with a wider event window and append it.
    async fn reset_scene(&self, story: &mut Story) -> Result<String, TurnError> {
        let builder = ContextBuilder::new(ContextConfig::full());
        let prompt = builder.build(
            story,
            "Re-describe the current scene from the top, keeping established facts but taking a fresh angle.",
            None,
        );
        let response = self
            .generation
            .generate(&prompt, &GenerationConfig::narrative())
            .await?;
        let text = protocol::scrub(&response);
        story.record_event(StoryEvent::narrative(text.clone()));
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_story, FailingGenerator, ScriptedGenerator};

    fn gm(responses: &[&str]) -> (GameMaster, Arc<ScriptedGenerator>) {
        let generator = Arc::new(ScriptedGenerator::with_responses(responses.to_vec()));
        (GameMaster::new(generator.clone()), generator)
    }

    fn seeded() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[tokio::test]
    async fn test_setup_turn_activates_story() {
        let (gm, _) = gm(&["The tavern falls silent as you enter."]);
        let mut story = Story::new("New Tale", "Fantasy");

        let outcome = gm
            .process_turn_with_rng(&mut story, "A lone ranger seeking work", &mut seeded())
            .await
            .unwrap();

        match outcome {
            TurnOutcome::SetupAdvanced { text, now_active } => {
                assert!(now_active);
                assert!(text.contains("tavern"));
            }
            other => panic!("expected SetupAdvanced, got {other:?}"),
        }
        assert_eq!(story.status, StoryStatus::Active);
        assert_eq!(story.events.len(), 1);
    }

    #[tokio::test]
    async fn test_plain_narrative_turn_no_roll() {
        let (gm, generator) = gm(&["Mira looks up from her ledger."]);
        let mut story = sample_story();

        let outcome = gm
            .process_turn_with_rng(&mut story, "I greet Mira warmly", &mut seeded())
            .await
            .unwrap();

        match outcome {
            TurnOutcome::Narrative { text, dice } => {
                assert_eq!(text, "Mira looks up from her ledger.");
                assert!(dice.is_none());
            }
            other => panic!("expected Narrative, got {other:?}"),
        }
        assert_eq!(story.events.len(), 3);
        assert_eq!(generator.prompts_seen().await.len(), 1);
    }

    #[tokio::test]
    async fn test_lexical_cue_pre_rolls_before_generation() {
        let (gm, generator) = gm(&["Your blade finds a gap in the armor."]);
        let mut story = sample_story();

        let outcome = gm
            .process_turn_with_rng(&mut story, "I attack the guard", &mut seeded())
            .await
            .unwrap();

        let dice = match outcome {
            TurnOutcome::Narrative { dice, .. } => dice.unwrap(),
            other => panic!("expected Narrative, got {other:?}"),
        };
        assert_eq!(dice.situation, Situation::Combat);

        // One generation call, already carrying the resolved roll.
        let prompts = generator.prompts_seen().await;
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("DICE RESULT: d20 (combat)"));
        assert_eq!(story.dice_history.len(), 1);
    }

    #[tokio::test]
    async fn test_pre_roll_wins_over_generator_directive() {
        // The generator asks for a roll anyway; the sentinel is stripped and
        // not honored, so the turn still carries exactly one roll.
        let (gm, generator) = gm(&[
            "You lunge.\nROLL: d20 | situation=combat | reason=already rolled",
        ]);
        let mut story = sample_story();

        let outcome = gm
            .process_turn_with_rng(&mut story, "I attack", &mut seeded())
            .await
            .unwrap();

        match outcome {
            TurnOutcome::Narrative { text, dice } => {
                assert_eq!(text, "You lunge.");
                assert!(dice.is_some());
            }
            other => panic!("expected Narrative, got {other:?}"),
        }
        assert_eq!(story.dice_history.len(), 1);
        assert_eq!(generator.prompts_seen().await.len(), 1);
    }

    #[tokio::test]
    async fn test_generator_directive_triggers_second_pass() {
        let (gm, generator) = gm(&[
            "The lock looks tricky.\nROLL: d20 | situation=investigation | reason=hidden mechanism",
            "You spot a worn pin; the mechanism yields.",
        ]);
        let mut story = sample_story();

        let outcome = gm
            .process_turn_with_rng(&mut story, "I study the strange lock", &mut seeded())
            .await
            .unwrap();

        match outcome {
            TurnOutcome::Narrative { text, dice } => {
                assert_eq!(text, "You spot a worn pin; the mechanism yields.");
                assert_eq!(dice.unwrap().situation, Situation::Investigation);
            }
            other => panic!("expected Narrative, got {other:?}"),
        }
        assert_eq!(generator.prompts_seen().await.len(), 2);
        assert_eq!(story.events.len(), 3);
        assert!(story.events[2].dice.is_some());
    }

    #[tokio::test]
    async fn test_generation_failure_leaves_story_unmutated() {
        let gm = GameMaster::new(Arc::new(FailingGenerator::new("down")));
        let mut story = sample_story();
        let events_before = story.events.len();
        let interactions_before = story.stats.interactions;

        let err = gm
            .process_turn_with_rng(&mut story, "I greet Mira", &mut seeded())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Generation(_)));
        assert_eq!(story.events.len(), events_before);
        assert_eq!(story.stats.interactions, interactions_before);
    }

    #[tokio::test]
    async fn test_checkpoint_commands_round_trip() {
        let (gm, _) = gm(&["The chase begins."]);
        let mut story = sample_story();

        let outcome = gm
            .process_turn_with_rng(&mut story, "/checkpoint before the chase", &mut seeded())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            TurnOutcome::Command(CommandOutcome::CheckpointCreated(_))
        ));

        gm.process_turn_with_rng(&mut story, "I run for the gate", &mut seeded())
            .await
            .unwrap();
        assert_eq!(story.events.len(), 3);

        let outcome = gm
            .process_turn_with_rng(&mut story, "/back chase", &mut seeded())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            TurnOutcome::Command(CommandOutcome::CheckpointRestored(_))
        ));
        assert_eq!(story.events.len(), 2);

        let outcome = gm
            .process_turn_with_rng(&mut story, "/list-checkpoints", &mut seeded())
            .await
            .unwrap();
        match outcome {
            TurnOutcome::Command(CommandOutcome::Checkpoints(list)) => assert_eq!(list.len(), 1),
            other => panic!("expected Checkpoints, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_back_miss_is_structured_payload_not_error() {
        let (gm, _) = gm(&[]);
        let mut story = sample_story();
        checkpoint::create(&mut story, Some("alpha"));
        let events_before = story.events.len();

        let outcome = gm
            .process_turn_with_rng(&mut story, "/back nonesuch", &mut seeded())
            .await
            .unwrap();
        match outcome {
            TurnOutcome::Command(CommandOutcome::CheckpointNotFound { selector, available }) => {
                assert_eq!(selector, "nonesuch");
                assert_eq!(available.len(), 1);
                assert_eq!(available[0].label, "alpha");
            }
            other => panic!("expected CheckpointNotFound, got {other:?}"),
        }
        assert_eq!(story.events.len(), events_before);
    }

    #[tokio::test]
    async fn test_back_with_no_checkpoints_is_structured_payload() {
        let (gm, _) = gm(&[]);
        let mut story = sample_story();

        let outcome = gm
            .process_turn_with_rng(&mut story, "/back", &mut seeded())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            TurnOutcome::Command(CommandOutcome::NoCheckpoints)
        ));
    }

    #[tokio::test]
    async fn test_character_and_info_commands() {
        let (gm, _) = gm(&[]);
        let mut story = sample_story();

        match gm
            .process_turn_with_rng(&mut story, "/char", &mut seeded())
            .await
            .unwrap()
        {
            TurnOutcome::Command(CommandOutcome::CharacterList(list)) => {
                assert_eq!(list.len(), 2)
            }
            other => panic!("expected CharacterList, got {other:?}"),
        }

        match gm
            .process_turn_with_rng(&mut story, "/char mira", &mut seeded())
            .await
            .unwrap()
        {
            TurnOutcome::Command(CommandOutcome::CharacterInfo { character, .. }) => {
                assert_eq!(character.unwrap().name, "Mira")
            }
            other => panic!("expected CharacterInfo, got {other:?}"),
        }

        // A miss is a payload, not an error.
        match gm
            .process_turn_with_rng(&mut story, "/char nobody", &mut seeded())
            .await
            .unwrap()
        {
            TurnOutcome::Command(CommandOutcome::CharacterInfo { character, name }) => {
                assert!(character.is_none());
                assert_eq!(name, "nobody");
            }
            other => panic!("expected CharacterInfo, got {other:?}"),
        }

        match gm
            .process_turn_with_rng(&mut story, "/info riverside", &mut seeded())
            .await
            .unwrap()
        {
            TurnOutcome::Command(CommandOutcome::Info { matches, .. }) => {
                assert_eq!(matches.locations.len(), 1)
            }
            other => panic!("expected Info, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_appends_no_event() {
        let (gm, generator) = gm(&["Sure, let's talk pacing."]);
        let mut story = sample_story();
        let events_before = story.events.len();

        let outcome = gm
            .process_turn_with_rng(&mut story, "/timeout the pacing feels rushed", &mut seeded())
            .await
            .unwrap();
        match outcome {
            TurnOutcome::Command(CommandOutcome::Timeout { text }) => {
                assert_eq!(text, "Sure, let's talk pacing.")
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert_eq!(story.events.len(), events_before);

        let prompts = generator.prompts_seen().await;
        assert!(prompts[0].contains("timeout"));
        assert!(prompts[0].contains("the pacing feels rushed"));
    }

    #[tokio::test]
    async fn test_reset_scene_appends_narrative_event() {
        let (gm, _) = gm(&["The shop again: dried herbs, a bolted door, Mira watching you."]);
        let mut story = sample_story();

        let outcome = gm
            .process_turn_with_rng(&mut story, "/reset-scene", &mut seeded())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            TurnOutcome::Command(CommandOutcome::SceneReset { .. })
        ));
        assert_eq!(story.events.len(), 3);
    }

    #[tokio::test]
    async fn test_end_completes_but_story_still_plays() {
        let (gm, _) = gm(&["An epilogue, of sorts."]);
        let mut story = sample_story();

        let outcome = gm
            .process_turn_with_rng(&mut story, "/end", &mut seeded())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            TurnOutcome::Command(CommandOutcome::Ended { .. })
        ));
        assert_eq!(story.status, StoryStatus::Completed);

        // Soft end: narrative turns still work afterwards.
        let outcome = gm
            .process_turn_with_rng(&mut story, "I linger at the ford", &mut seeded())
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::Narrative { .. }));
        assert_eq!(story.status, StoryStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_command_lists_supported_without_mutation() {
        let (gm, _) = gm(&[]);
        let mut story = sample_story();
        let events_before = story.events.len();

        let outcome = gm
            .process_turn_with_rng(&mut story, "/dance", &mut seeded())
            .await
            .unwrap();
        match outcome {
            TurnOutcome::Command(CommandOutcome::Unknown { name, supported }) => {
                assert_eq!(name, "/dance");
                assert!(supported.contains(&"/checkpoint"));
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
        assert_eq!(story.events.len(), events_before);
    }

    #[tokio::test]
    async fn test_compaction_runs_on_due_turns() {
        let generator = Arc::new(ScriptedGenerator::with_responses([
            "SUMMARY:\nEvents so far, condensed.\nKEYWORDS:\nCharacters: Mira",
            "The story moves on.",
        ]));
        let gm = GameMaster::new(generator.clone())
            .with_summarizer(Summarizer::new().with_interval(2));
        let mut story = sample_story(); // 2 events: compaction due

        gm.process_turn_with_rng(&mut story, "I look around", &mut seeded())
            .await
            .unwrap();

        assert_eq!(story.summaries.len(), 1);
        assert_eq!(story.summaries[0].event_count, 2);
        // First generation call was the summary prompt, second the turn.
        let prompts = generator.prompts_seen().await;
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("STORY SUMMARY REQUEST"));
    }
}
