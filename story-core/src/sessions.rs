//! Session facade.
//!
//! `StorySessions` owns the store and the game master and serializes all
//! access per story: a turn holds that story's lock across the whole
//! load, process, save cycle, so two concurrent turns against the same story
//! can never interleave their read-modify-write. Turns against different
//! stories proceed in parallel.

use crate::story::{EventKind, Story, StoryEvent, StoryId};
use crate::store::{StoreError, StoryStore};
use crate::turn::{GameMaster, TurnError, TurnOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("story {0} not found")]
    StoryNotFound(StoryId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Turn(#[from] TurnError),
}

/// Parameters for starting a new story.
#[derive(Debug, Clone)]
pub struct StartStory {
    pub title: String,
    pub genre: String,
    /// The player's initial idea of what the story should be.
    pub prompt: String,
}

/// Entry point for multi-story play over a shared store.
pub struct StorySessions {
    store: Arc<dyn StoryStore>,
    gm: GameMaster,
    locks: std::sync::Mutex<HashMap<StoryId, Arc<Mutex<()>>>>,
}

impl StorySessions {
    pub fn new(store: Arc<dyn StoryStore>, gm: GameMaster) -> Self {
        Self {
            store,
            gm,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: StoryId) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(id).or_default().clone()
    }

    /// Drop the registry entry once no other turn holds or awaits the lock.
    /// Clones only happen under the registry mutex, so the count cannot grow
    /// while we check it.
    fn prune_lock(&self, id: StoryId, lock: Arc<Mutex<()>>) {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Two handles left: the registry's and ours.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&id);
        }
    }

    /// Create a story in setup status and generate its opening exchange
    /// (clarifying questions, or a scene if the prompt is rich enough).
    ///
    /// Nothing is persisted if the opening generation fails.
    pub async fn start_story(&self, params: StartStory) -> Result<(Story, String), SessionError> {
        let mut story = Story::new(params.title, params.genre);
        tracing::info!(story = %story.id, "starting story");

        let intro = self.gm.open_exchange(&story, &params.prompt).await?;
        story.record_event(StoryEvent {
            kind: EventKind::System,
            description: format!("Story premise: {}", params.prompt),
            timestamp: chrono::Utc::now(),
            dice: None,
        });

        self.store.save(&story).await?;
        Ok((story, intro))
    }

    /// Run one turn: load, process, save, under the story's lock.
    pub async fn take_turn(
        &self,
        id: StoryId,
        raw_input: &str,
    ) -> Result<TurnOutcome, SessionError> {
        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().await;
            self.locked_turn(id, raw_input).await
        };
        self.prune_lock(id, lock);
        result
    }

    async fn locked_turn(
        &self,
        id: StoryId,
        raw_input: &str,
    ) -> Result<TurnOutcome, SessionError> {
        let mut story = self
            .store
            .get(id)
            .await?
            .ok_or(SessionError::StoryNotFound(id))?;

        let outcome = self.gm.process_turn(&mut story, raw_input).await?;
        self.store.save(&story).await?;
        Ok(outcome)
    }

    /// Load a story without taking a turn.
    pub async fn get_story(&self, id: StoryId) -> Result<Story, SessionError> {
        self.store
            .get(id)
            .await?
            .ok_or(SessionError::StoryNotFound(id))
    }
}
