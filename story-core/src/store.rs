//! Story persistence.
//!
//! The engine speaks to an abstract `StoryStore`; two implementations ship
//! here. `MemoryStore` backs tests and ephemeral play, `JsonFileStore` keeps
//! one pretty-printed JSON file per story so saves stay inspectable and
//! hand-editable.

use crate::story::{Story, StoryId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("story serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Abstract story persistence: load by id, save whole.
#[async_trait]
pub trait StoryStore: Send + Sync {
    async fn get(&self, id: StoryId) -> Result<Option<Story>, StoreError>;
    async fn save(&self, story: &Story) -> Result<(), StoreError>;
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    stories: RwLock<HashMap<StoryId, Story>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoryStore for MemoryStore {
    async fn get(&self, id: StoryId) -> Result<Option<Story>, StoreError> {
        Ok(self.stories.read().await.get(&id).cloned())
    }

    async fn save(&self, story: &Story) -> Result<(), StoreError> {
        self.stories.write().await.insert(story.id, story.clone());
        Ok(())
    }
}

/// One JSON file per story under a base directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: StoryId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl StoryStore for JsonFileStore {
    async fn get(&self, id: StoryId) -> Result<Option<Story>, StoreError> {
        let path = self.path_for(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn save(&self, story: &Story) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(story)?;
        // Write-then-rename so a crash mid-save never truncates a story.
        let tmp = self.dir.join(format!("{}.json.tmp", story.id));
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, self.path_for(story.id)).await?;
        Ok(())
    }
}
