//! Short-horizon conversation state: one bounded rolling window of turns per
//! channel. Windows are independent and never shared across channels; the
//! orchestrator keys each one under its own lock.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub speaker_name: String,
}

/// Rolling window of the most recent turns in one channel.
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    max_len: usize,
    turns: VecDeque<Turn>,
}

impl ConversationWindow {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            turns: VecDeque::with_capacity(max_len.min(64)),
        }
    }

    pub fn append_turn(&mut self, role: Role, text: &str, speaker_name: &str) {
        self.turns.push_back(Turn {
            role,
            text: text.to_string(),
            speaker_name: speaker_name.to_string(),
        });
        while self.turns.len() > self.max_len {
            self.turns.pop_front();
        }
    }

    /// The last `n` turns, oldest first.
    pub fn window(&self, n: usize) -> Vec<&Turn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
