//! Collaborative-fiction engine with an AI Game Master.
//!
//! This crate provides:
//! - Turn processing: free-text narrative turns and slash commands
//! - Situation-based d20 resolution with a generator-driven roll protocol
//! - Bounded prompt assembly over windowed story state and summaries
//! - Periodic history compaction with keyword-based retrieval
//! - Named checkpoints with restore
//! - Pluggable persistence and text generation, with provider fallback
//!
//! # Quick Start
//!
//! ```ignore
//! use story_core::{GameMaster, MemoryStore, StartStory, StorySessions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let generation = Arc::new(my_provider());
//!     let sessions = StorySessions::new(
//!         Arc::new(MemoryStore::new()),
//!         GameMaster::new(generation),
//!     );
//!
//!     let (story, intro) = sessions
//!         .start_story(StartStory {
//!             title: "The Hollow Crown".into(),
//!             genre: "Fantasy".into(),
//!             prompt: "A ranger hunting a usurper".into(),
//!         })
//!         .await?;
//!     println!("{intro}");
//!
//!     let outcome = sessions.take_turn(story.id, "I enter the tavern").await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod command;
pub mod context;
pub mod dice;
pub mod generate;
pub mod protocol;
pub mod sessions;
pub mod store;
pub mod story;
pub mod summary;
pub mod testing;
pub mod turn;

// Primary public API
pub use checkpoint::{CheckpointError, CheckpointInfo};
pub use command::{Command, PlayerInput, SUPPORTED_COMMANDS};
pub use context::{ContextBuilder, ContextConfig};
pub use dice::{DiceOutcome, Situation};
pub use generate::{FallbackGenerator, GenerationConfig, GenerationError, GenerationService};
pub use sessions::{SessionError, StartStory, StorySessions};
pub use store::{JsonFileStore, MemoryStore, StoreError, StoryStore};
pub use story::{Story, StoryEvent, StoryId, StoryStatus};
pub use summary::Summarizer;
pub use turn::{CommandOutcome, GameMaster, TurnError, TurnOutcome};
