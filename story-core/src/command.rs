//! Player input classification.
//!
//! Raw input is either free text for the narrative pipeline or a slash
//! command. Commands parse into a closed enum so dispatch can match
//! exhaustively instead of chaining prefix checks.

use serde::{Deserialize, Serialize};

/// Command names shown to the player when they type something unknown.
pub const SUPPORTED_COMMANDS: &[&str] = &[
    "/checkpoint",
    "/back",
    "/list-checkpoints",
    "/char",
    "/info",
    "/timeout",
    "/reset-scene",
    "/end",
];

/// A parsed slash command with its argument payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// `/checkpoint [label]` - snapshot the current story state.
    Checkpoint { label: Option<String> },
    /// `/back [id-or-label]` - restore a checkpoint.
    Back { selector: Option<String> },
    /// `/list-checkpoints`
    ListCheckpoints,
    /// `/char [name]` - list characters, or show one.
    Character { name: Option<String> },
    /// `/info <query>` - search story records.
    Info { query: Option<String> },
    /// `/timeout [topic]` - out-of-story meta discussion.
    Timeout { topic: Option<String> },
    /// `/reset-scene` - regenerate the current scene.
    ResetScene,
    /// `/end` - mark the story completed.
    End,
    /// Anything else starting with `/`.
    Unknown { name: String },
}

/// Player input as seen by the turn processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerInput {
    FreeText(String),
    Command(Command),
}

impl PlayerInput {
    /// Classify raw input. Input is a command iff its trimmed form starts
    /// with `/`; everything else is free text, passed through verbatim.
    pub fn parse(raw: &str) -> PlayerInput {
        let trimmed = raw.trim();
        if !trimmed.starts_with('/') {
            return PlayerInput::FreeText(raw.to_string());
        }

        let (name, argument) = match trimmed.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (trimmed, ""),
        };
        let argument = if argument.is_empty() {
            None
        } else {
            Some(argument.to_string())
        };

        let command = match name.to_lowercase().as_str() {
            "/checkpoint" => Command::Checkpoint { label: argument },
            "/back" => Command::Back { selector: argument },
            "/list-checkpoints" => Command::ListCheckpoints,
            "/char" => Command::Character { name: argument },
            "/info" => Command::Info { query: argument },
            "/timeout" => Command::Timeout { topic: argument },
            "/reset-scene" => Command::ResetScene,
            "/end" => Command::End,
            other => Command::Unknown {
                name: other.to_string(),
            },
        };
        PlayerInput::Command(command)
    }
}
