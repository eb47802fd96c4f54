pub mod repository;

use crate::models::chat::{ ChatMessage, ChatTurn, Speaker };
use log::warn;
use std::collections::VecDeque;
use thiserror::Error;

pub use repository::{ InMemorySessionRepository, SessionRepository };

pub const DEFAULT_HISTORY_CAP: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no turn to append to")]
    NoTurn,
    #[error("last turn belongs to the user")]
    NotAssistantTurn,
}

/// Ordered turns of one conversation, bounded to `cap` entries.
#[derive(Clone, Debug)]
pub struct SessionState {
    turns: VecDeque<ChatTurn>,
    cap: usize,
}

impl SessionState {
    pub fn new(cap: usize) -> Self {
        if cap == 0 {
            warn!("History cap of 0 raised to 1");
        }
        let cap = cap.max(1);
        Self {
            turns: VecDeque::with_capacity(cap + 1),
            cap,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.back()
    }

    pub fn append(&mut self, turn: ChatTurn) {
        self.turns.push_back(turn);
        self.enforce_cap();
    }

    /// Drops the oldest turns until the cap holds again. Returns how many
    /// were evicted.
    pub fn enforce_cap(&mut self) -> usize {
        trim_to_cap(&mut self.turns, self.cap)
    }

    pub fn append_char(&mut self, ch: char) -> Result<(), SessionError> {
        let mut buf = [0u8; 4];
        self.append_fragment(ch.encode_utf8(&mut buf))
    }

    /// Grows the in-progress assistant turn.
    pub fn append_fragment(&mut self, fragment: &str) -> Result<(), SessionError> {
        let last = self.turns.back_mut().ok_or(SessionError::NoTurn)?;
        if last.speaker != Speaker::Assistant {
            return Err(SessionError::NotAssistantTurn);
        }
        last.text.push_str(fragment);
        Ok(())
    }

    /// Removes the trailing turn if it is an assistant turn.
    pub fn discard_pending_assistant(&mut self) -> Option<ChatTurn> {
        match self.turns.back() {
            Some(turn) if turn.speaker == Speaker::Assistant => self.turns.pop_back(),
            _ => None,
        }
    }

    /// The last `window` turns as wire messages, oldest first.
    pub fn recent_messages(&self, window: usize) -> Vec<ChatMessage> {
        let skip = self.turns.len().saturating_sub(window);
        self.turns.iter().skip(skip).map(ChatMessage::from).collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP)
    }
}

/// FIFO eviction shared by every place that commits turns.
pub fn trim_to_cap(turns: &mut VecDeque<ChatTurn>, cap: usize) -> usize {
    let overflow = turns.len().saturating_sub(cap);
    turns.drain(..overflow);
    overflow
}
