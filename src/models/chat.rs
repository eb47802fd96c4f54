use chrono::Utc;
use serde::{ Serialize, Deserialize };
use std::fmt;

/// Who produced a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn as_role(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_role())
    }
}

/// One entry of a conversation. Assistant turns start empty and grow while
/// their reply is being revealed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: i64,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Empty assistant turn awaiting a reveal.
    pub fn pending_assistant() -> Self {
        Self::assistant(String::new())
    }

    pub fn is_user(&self) -> bool {
        self.speaker == Speaker::User
    }
}

/// Wire-level `{role, content}` pair sent to the completion endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

impl From<&ChatTurn> for ChatMessage {
    fn from(turn: &ChatTurn) -> Self {
        ChatMessage::new(turn.speaker.as_role(), turn.text.clone())
    }
}

/// Everything the completion client needs for one user turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub user_input: String,
}

impl CompletionRequest {
    /// System message, history, then the new user input, in the order the
    /// OpenAI-compatible `messages` array expects.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::new("system", self.system_prompt.clone()));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::new("user", self.user_input.clone()));
        messages
    }
}
