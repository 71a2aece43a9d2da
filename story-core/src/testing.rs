//! Testing utilities.
//!
//! Deterministic stand-ins for the generation service so orchestration tests
//! run without network access:
//! - `ScriptedGenerator` returns canned responses in order and records every
//!   prompt it receives
//! - `FailingGenerator` always errors, for fallback and degraded-mode paths

use crate::generate::{GenerationConfig, GenerationError, GenerationService};
use crate::story::{Character, Location, Story, StoryEvent, StoryStatus};
use async_trait::async_trait;
use tokio::sync::Mutex;

/// A generation service that replays scripted responses.
///
/// When the script runs out, a fixed placeholder is returned so tests fail
/// on content assertions rather than panics.
pub struct ScriptedGenerator {
    responses: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let generator = Self::new();
        let mut queue: Vec<String> = responses.into_iter().map(Into::into).collect();
        queue.reverse(); // stored back-to-front so pop() yields in order
        *generator.responses.try_lock().expect("fresh lock") = queue;
        generator
    }

    /// Queue one more response at the end of the script.
    pub async fn queue(&self, response: impl Into<String>) {
        let mut responses = self.responses.lock().await;
        responses.insert(0, response.into());
    }

    /// Every prompt this generator has been asked to complete, in order.
    pub async fn prompts_seen(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        self.prompts.lock().await.push(prompt.to_string());
        let mut responses = self.responses.lock().await;
        Ok(responses
            .pop()
            .unwrap_or_else(|| "The script has no more responses.".to_string()))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

/// A generation service that always fails.
pub struct FailingGenerator {
    id: String,
}

impl FailingGenerator {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl GenerationService for FailingGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::Provider {
            provider: self.id.clone(),
            message: "scripted failure".to_string(),
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

/// An active story with a few characters, locations and events, for tests
/// that need populated state.
pub fn sample_story() -> Story {
    let mut story = Story::new("The Hollow Crown", "Fantasy");
    story.status = StoryStatus::Active;
    story.world.setting = "The windswept valley of Karse".to_string();

    story.upsert_character(Character::new("Mira", "A nervous herbalist"));
    story.upsert_character(Character::new("Baron Aldric", "Rules the valley with old debts"));
    story.upsert_location(Location::new("Riverside", "A village clustered at the ford"));

    story.record_event(StoryEvent::narrative(
        "You arrive at Riverside as the light fails. Lanterns gutter along the ford.",
    ));
    story.record_event(StoryEvent::narrative(
        "Mira waves you into her shop and bolts the door behind you.",
    ));
    story
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let generator = ScriptedGenerator::with_responses(["one", "two"]);
        let config = GenerationConfig::narrative();

        assert_eq!(generator.generate("a", &config).await.unwrap(), "one");
        assert_eq!(generator.generate("b", &config).await.unwrap(), "two");
        assert!(generator
            .generate("c", &config)
            .await
            .unwrap()
            .contains("no more responses"));
        assert_eq!(generator.prompts_seen().await, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sample_story_is_active() {
        let story = sample_story();
        assert_eq!(story.status, StoryStatus::Active);
        assert_eq!(story.events.len(), 2);
        assert!(story.find_character("mira").is_some());
    }
}
