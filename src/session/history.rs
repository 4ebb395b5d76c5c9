use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::User => write!(f, "you"),
            Speaker::Agent => write!(f, "agent"),
        }
    }
}

/// A single entry in the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,

    pub text: String,

    /// When this entry was recorded. Only insertion order is meaningful.
    pub created_at: DateTime<Utc>,
}

/// Append-only record of the conversation
///
/// Entries are never edited after insertion; the store is only cleared when
/// the conversation is stopped.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    turns: Vec<Turn>,
    revision: u64,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, speaker: Speaker, text: impl Into<String>) -> &Turn {
        self.turns.push(Turn {
            speaker,
            text: text.into(),
            created_at: Utc::now(),
        });
        self.revision += 1;
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Counter bumped on every append and clear
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.revision += 1;
    }
}
