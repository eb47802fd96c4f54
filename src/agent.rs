use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig, PromptError };
use crate::config::settings::{ SettingsStore, Tone };
use crate::llm::chat::{ new_client as new_chat_client, ChatClient, CompletionError };
use crate::llm::LlmConfig;
use crate::models::chat::ChatTurn;
use crate::models::context::PromptContext;
use crate::reveal::{ RevealHandle, RevealOutcome, RevealScheduler };
use crate::session::{ SessionRepository, SessionState };

use log::{ debug, error, info, warn };
use std::error::Error;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_HISTORY_WINDOW: usize = 3;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("session store error: {0}")]
    Store(String),
}

impl AgentError {
    /// Text for the alert shown when a turn fails.
    pub fn user_message(&self) -> &'static str {
        crate::llm::chat::RETRIEVAL_FAILED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Blank input; nothing was sent.
    EmptyInput,
    /// A request or reveal is already in flight for this session.
    Busy,
}

pub enum SendOutcome {
    Started(RevealHandle),
    Rejected(Rejection),
    /// Shutdown or reset arrived before the reply came back.
    Cancelled,
}

type ActiveTurn = Arc<std::sync::Mutex<Option<CancellationToken>>>;

fn swap_active(slot: &ActiveTurn, token: Option<CancellationToken>) -> Option<CancellationToken> {
    match slot.lock() {
        Ok(mut guard) => std::mem::replace(&mut *guard, token),
        Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), token),
    }
}

/// Holds the busy flag and the turn's cancellation token for the duration of
/// a turn. Dropping it, on any path, re-enables input.
struct BusyGuard {
    flag: Arc<AtomicBool>,
    active: ActiveTurn,
    cancel: CancellationToken,
}

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>, active: &ActiveTurn) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok()?;
        let cancel = CancellationToken::new();
        swap_active(active, Some(cancel.clone()));
        Some(Self {
            flag: flag.clone(),
            active: active.clone(),
            cancel,
        })
    }

    fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        swap_active(&self.active, None);
        self.flag.store(false, Ordering::Release);
    }
}

pub struct AgentOptions {
    pub user_id: String,
    pub context: PromptContext,
    pub history_window: usize,
    pub reveal_interval: Duration,
}

/// One chat surface: a user's session, the page context it is grounded in,
/// and at most one turn in flight.
pub struct MuminAgent {
    chat_client: Arc<dyn ChatClient>,
    settings: Arc<dyn SettingsStore>,
    sessions: Arc<dyn SessionRepository>,
    prompt_config: Arc<PromptConfig>,
    context: PromptContext,
    user_id: String,
    history_window: usize,
    reveal: RevealScheduler,
    session: Arc<Mutex<SessionState>>,
    busy: Arc<AtomicBool>,
    active_turn: ActiveTurn,
}

impl MuminAgent {
    pub async fn new(
        chat_client: Arc<dyn ChatClient>,
        settings: Arc<dyn SettingsStore>,
        sessions: Arc<dyn SessionRepository>,
        prompt_config: Arc<PromptConfig>,
        options: AgentOptions
    ) -> Result<Self, AgentError> {
        let state = sessions
            .get(&options.user_id).await
            .map_err(|e| AgentError::Store(e.to_string()))?;
        info!(
            "Session for user {} loaded with {} turns (cap {}), context: {}",
            options.user_id,
            state.len(),
            state.cap(),
            options.context.kind()
        );

        Ok(Self {
            chat_client,
            settings,
            sessions,
            prompt_config,
            context: options.context,
            user_id: options.user_id,
            history_window: options.history_window,
            reveal: RevealScheduler::new(options.reveal_interval),
            session: Arc::new(Mutex::new(state)),
            busy: Arc::new(AtomicBool::new(false)),
            active_turn: Arc::new(std::sync::Mutex::new(None)),
        })
    }

    pub async fn from_args(
        args: &Args,
        settings: Arc<dyn SettingsStore>,
        sessions: Arc<dyn SessionRepository>,
        prompt_config: Arc<PromptConfig>,
        context: PromptContext,
        user_id: String
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chat_config = LlmConfig {
            llm_type: args.chat_llm_type.parse()?,
            api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
            completion_model: args.chat_model.clone(),
            base_url: args.chat_base_url.clone(),
            temperature: args.temperature,
            max_tokens: args.max_tokens,
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, URL={}",
            chat_config.llm_type,
            chat_client.get_model(),
            chat_client.get_base_url().as_deref().unwrap_or("adapter default")
        );

        let options = AgentOptions {
            user_id,
            context,
            history_window: args.history_window,
            reveal_interval: Duration::from_millis(args.reveal_interval_ms),
        };
        Ok(Self::new(chat_client, settings, sessions, prompt_config, options).await?)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// True while a request or reveal is in flight; input should be disabled.
    pub fn is_loading(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn turns(&self) -> Vec<ChatTurn> {
        self.session.lock().await.turns().cloned().collect()
    }

    async fn current_tone(&self) -> Tone {
        // Awaited before composing so the preference always applies.
        match self.settings.get_tone().await {
            Ok(tone) => tone,
            Err(e) => {
                warn!("Error getting tone, using default: {}", e);
                Tone::default()
            }
        }
    }

    async fn commit(&self) -> Result<(), AgentError> {
        let state = self.session.lock().await;
        commit_snapshot(&self.sessions, &self.user_id, state.clone()).await
    }

    /// Runs one user turn: composes the request, performs the completion
    /// call and starts revealing the reply. Returns once the reveal has
    /// started; the handle reports its progress.
    pub async fn send(&self, input: &str) -> Result<SendOutcome, AgentError> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(SendOutcome::Rejected(Rejection::EmptyInput));
        }
        let Some(guard) = BusyGuard::acquire(&self.busy, &self.active_turn) else {
            debug!("Send ignored, a turn is already in flight");
            return Ok(SendOutcome::Rejected(Rejection::Busy));
        };
        let cancel = guard.token();

        let tone = self.current_tone().await;
        let request = {
            let mut state = self.session.lock().await;
            let request = prompt::compose_request(
                &self.prompt_config,
                &state,
                &self.context,
                tone,
                self.history_window,
                text
            )?;
            if cancel.is_cancelled() {
                return Ok(SendOutcome::Cancelled);
            }
            state.append(ChatTurn::user(text));
            request
        };
        self.commit().await?;

        let completion = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.chat_client.complete(&request) => Some(result),
        };
        let reply = match completion {
            Some(Ok(reply)) => reply,
            Some(Err(e)) => {
                error!("Completion failed for user {}: {}", self.user_id, e);
                return Err(e.into());
            }
            None => {
                return self.abandon_turn().await;
            }
        };
        let reply = reply.trim().to_string();
        debug!("Reply received ({} bytes), starting reveal", reply.len());

        {
            let mut state = self.session.lock().await;
            if cancel.is_cancelled() {
                drop(state);
                return self.abandon_turn().await;
            }
            state.append(ChatTurn::pending_assistant());
        }

        let session = self.session.clone();
        let sessions = self.sessions.clone();
        let user_id = self.user_id.clone();
        let handle = self.reveal.spawn(self.session.clone(), reply, cancel, move |outcome| async move {
            finish_reveal(outcome, session, sessions, user_id).await;
            drop(guard);
        });
        Ok(SendOutcome::Started(handle))
    }

    async fn abandon_turn(&self) -> Result<SendOutcome, AgentError> {
        info!("Turn for user {} cancelled before the reply arrived", self.user_id);
        self.commit().await?;
        Ok(SendOutcome::Cancelled)
    }

    /// Cancels the turn in flight, if any: a pending completion call is
    /// abandoned and a running reveal stops. Used on teardown.
    pub fn shutdown(&self) {
        if let Some(token) = swap_active(&self.active_turn, None) {
            info!("Cancelling active turn for user {}", self.user_id);
            token.cancel();
        }
    }

    /// Starts a fresh conversation for this user.
    pub async fn reset(&self) -> Result<(), AgentError> {
        self.shutdown();
        let mut state = self.session.lock().await;
        state.clear();
        self.sessions.reset(&self.user_id).await.map_err(|e| AgentError::Store(e.to_string()))
    }
}

impl Drop for MuminAgent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn commit_snapshot(
    sessions: &Arc<dyn SessionRepository>,
    user_id: &str,
    mut snapshot: SessionState
) -> Result<(), AgentError> {
    snapshot.enforce_cap();
    sessions.put(user_id, snapshot).await.map_err(|e| AgentError::Store(e.to_string()))
}

async fn finish_reveal(
    outcome: RevealOutcome,
    session: Arc<Mutex<SessionState>>,
    sessions: Arc<dyn SessionRepository>,
    user_id: String
) {
    let mut state = session.lock().await;
    match &outcome {
        RevealOutcome::Completed { ticks } => {
            debug!("Reveal completed after {} ticks", ticks);
        }
        RevealOutcome::Cancelled { ticks } => {
            info!("Reveal cancelled after {} ticks, dropping partial reply", ticks);
            state.discard_pending_assistant();
        }
        RevealOutcome::Aborted { reason, .. } => {
            warn!("Reveal aborted: {}", reason);
        }
    }

    // Held across the write so a concurrent reset cannot be overwritten.
    if let Err(e) = commit_snapshot(&sessions, &user_id, state.clone()).await {
        error!("Failed to commit session for user {}: {}", user_id, e);
    }
}
