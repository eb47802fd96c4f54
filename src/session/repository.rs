use async_trait::async_trait;
use log::{ debug, info };
use std::collections::HashMap;
use std::error::Error;
use tokio::sync::RwLock;

use super::SessionState;

/// Per-user conversation storage. Lives as long as the application; `reset`
/// is the logout / new-conversation path.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<SessionState, Box<dyn Error + Send + Sync>>;

    async fn put(
        &self,
        user_id: &str,
        state: SessionState
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    async fn reset(&self, user_id: &str) -> Result<(), Box<dyn Error + Send + Sync>>;
}

pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, SessionState>>,
    cap: usize,
}

impl InMemorySessionRepository {
    pub fn new(cap: usize) -> Self {
        info!("Conversations are kept in memory, capped at {} turns per user", cap);
        Self {
            sessions: RwLock::new(HashMap::new()),
            cap,
        }
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn get(&self, user_id: &str) -> Result<SessionState, Box<dyn Error + Send + Sync>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| SessionState::new(self.cap)))
    }

    async fn put(
        &self,
        user_id: &str,
        mut state: SessionState
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let evicted = state.enforce_cap();
        if evicted > 0 {
            debug!("Evicted {} old turns for user {}", evicted, user_id);
        }
        self.sessions.write().await.insert(user_id.to_string(), state);
        Ok(())
    }

    async fn reset(&self, user_id: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.sessions.write().await.remove(user_id).is_some() {
            info!("Conversation for user {} cleared", user_id);
        }
        Ok(())
    }
}
