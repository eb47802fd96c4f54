//! Typewriter reveal of a finished reply into the in-progress assistant turn.
//!
//! A reveal owns a cancellation token and a timer. Each tick appends one
//! extended grapheme cluster, so combining marks and multi-byte letters
//! are never split. The tick after the last grapheme finishes the reveal.

use futures::Future;
use log::{ debug, warn };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{ mpsc, Mutex };
use tokio::task::JoinHandle;
use tokio::time::{ self, MissedTickBehavior };
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use unicode_segmentation::UnicodeSegmentation;

use crate::session::SessionState;

pub const DEFAULT_REVEAL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevealEvent {
    /// `grapheme` was appended; `index` counts from zero.
    Tick {
        index: usize,
        grapheme: String,
    },
    Finished {
        text: String,
    },
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevealOutcome {
    Completed {
        ticks: usize,
    },
    Cancelled {
        ticks: usize,
    },
    /// The session no longer ended in an assistant turn.
    Aborted {
        ticks: usize,
        reason: String,
    },
}

impl RevealOutcome {
    pub fn ticks(&self) -> usize {
        match self {
            RevealOutcome::Completed { ticks }
            | RevealOutcome::Cancelled { ticks }
            | RevealOutcome::Aborted { ticks, .. } => *ticks,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RevealOutcome::Completed { .. })
    }
}

#[derive(Clone, Debug)]
pub struct RevealScheduler {
    interval: Duration,
}

impl Default for RevealScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_REVEAL_INTERVAL)
    }
}

impl RevealScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drives one reveal to its end on the current task. The caller must have
    /// appended an empty assistant turn to `session`.
    pub async fn run(
        &self,
        session: Arc<Mutex<SessionState>>,
        text: &str,
        cancel: CancellationToken,
        events: Option<mpsc::UnboundedSender<RevealEvent>>
    ) -> RevealOutcome {
        let emit = |event: RevealEvent| {
            if let Some(tx) = &events {
                // A closed receiver only means nobody is rendering.
                let _ = tx.send(event);
            }
        };

        let graphemes: Vec<&str> = text.graphemes(true).collect();
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cursor = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Reveal cancelled after {} of {} graphemes", cursor, graphemes.len());
                    emit(RevealEvent::Cancelled);
                    return RevealOutcome::Cancelled { ticks: cursor };
                }
                _ = ticker.tick() => {}
            }

            let Some(grapheme) = graphemes.get(cursor) else {
                emit(RevealEvent::Finished { text: text.to_string() });
                return RevealOutcome::Completed { ticks: cursor };
            };

            if let Err(e) = session.lock().await.append_fragment(grapheme) {
                warn!("Reveal stopped: {}", e);
                return RevealOutcome::Aborted {
                    ticks: cursor,
                    reason: e.to_string(),
                };
            }
            emit(RevealEvent::Tick {
                index: cursor,
                grapheme: grapheme.to_string(),
            });
            cursor += 1;
        }
    }

    /// Spawns the reveal and hands its outcome to `on_finish` on the same
    /// task, whatever the outcome. `cancel` may be shared with whoever owns
    /// the rest of the turn.
    pub fn spawn<F, Fut>(
        &self,
        session: Arc<Mutex<SessionState>>,
        text: String,
        cancel: CancellationToken,
        on_finish: F
    ) -> RevealHandle
        where F: FnOnce(RevealOutcome) -> Fut + Send + 'static, Fut: Future<Output = ()> + Send + 'static
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = self.clone();
        let token = cancel.clone();

        let join = tokio::spawn(async move {
            let outcome = scheduler.run(session, &text, token, Some(tx)).await;
            on_finish(outcome.clone()).await;
            outcome
        });

        RevealHandle {
            cancel,
            join,
            events: Some(rx),
        }
    }
}

/// Caller's side of a running reveal.
pub struct RevealHandle {
    cancel: CancellationToken,
    join: JoinHandle<RevealOutcome>,
    events: Option<mpsc::UnboundedReceiver<RevealEvent>>,
}

impl RevealHandle {
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Progress events. Can be taken once.
    pub fn take_events(&mut self) -> Option<UnboundedReceiverStream<RevealEvent>> {
        self.events.take().map(UnboundedReceiverStream::new)
    }

    pub async fn wait(self) -> RevealOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) =>
                RevealOutcome::Aborted {
                    ticks: 0,
                    reason: format!("reveal task failed: {}", e),
                },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::ChatTurn;
    use futures::StreamExt;

    fn session_with_pending() -> Arc<Mutex<SessionState>> {
        let mut state = SessionState::new(20);
        state.append(ChatTurn::user("Selam"));
        state.append(ChatTurn::pending_assistant());
        Arc::new(Mutex::new(state))
    }

    async fn last_text(session: &Arc<Mutex<SessionState>>) -> String {
        session.lock().await.last().unwrap().text.clone()
    }

    #[tokio::test(start_paused = true)]
    async fn one_tick_per_character_with_strict_prefixes() {
        let session = session_with_pending();
        let scheduler = RevealScheduler::new(Duration::from_millis(5));
        let mut handle = scheduler.spawn(session.clone(), "Merhaba".into(), CancellationToken::new(), |_| async {});
        let mut events = handle.take_events().unwrap();

        let mut ticks = 0;
        while let Some(event) = events.next().await {
            match event {
                RevealEvent::Tick { index, .. } => {
                    assert_eq!(index, ticks);
                    ticks += 1;
                    let text = last_text(&session).await;
                    assert_eq!(text, "Merhaba".chars().take(ticks).collect::<String>());
                    if ticks < 7 {
                        assert_ne!(text, "Merhaba");
                    }
                }
                RevealEvent::Finished { text } => {
                    assert_eq!(text, "Merhaba");
                    break;
                }
                RevealEvent::Cancelled => panic!("not cancelled"),
            }
        }

        assert_eq!(ticks, 7);
        assert_eq!(handle.wait().await, RevealOutcome::Completed { ticks: 7 });
        assert_eq!(last_text(&session).await, "Merhaba");
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_takes_one_interval_per_grapheme_plus_finish() {
        let session = session_with_pending();
        let scheduler = RevealScheduler::new(Duration::from_millis(5));
        let started = time::Instant::now();

        let outcome = scheduler.run(session, "abc", CancellationToken::new(), None).await;

        assert_eq!(outcome, RevealOutcome::Completed { ticks: 3 });
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(20) && elapsed < Duration::from_millis(25));
    }

    #[tokio::test(start_paused = true)]
    async fn graphemes_are_never_split() {
        let session = session_with_pending();
        let scheduler = RevealScheduler::default();
        // "i̇" is i + combining dot above, "ş" is precomposed.
        let text = "i\u{307}ş";

        let outcome = scheduler.run(session.clone(), text, CancellationToken::new(), None).await;

        assert_eq!(outcome.ticks(), 2);
        assert_eq!(last_text(&session).await, text);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_mid_reveal() {
        let session = session_with_pending();
        let scheduler = RevealScheduler::new(Duration::from_millis(5));
        let mut handle = scheduler.spawn(session.clone(), "Esselamü aleyküm".into(), CancellationToken::new(), |_| async {});
        let mut events = handle.take_events().unwrap();

        for _ in 0..3 {
            assert!(matches!(events.next().await, Some(RevealEvent::Tick { .. })));
        }
        handle.cancel();

        assert_eq!(events.next().await, Some(RevealEvent::Cancelled));
        assert_eq!(handle.wait().await, RevealOutcome::Cancelled { ticks: 3 });
        assert_eq!(last_text(&session).await, "Ess");
    }

    #[tokio::test(start_paused = true)]
    async fn shared_token_cancelled_up_front_reveals_nothing() {
        let session = session_with_pending();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let handle = RevealScheduler::default().spawn(session.clone(), "Merhaba".into(), cancel, |_| async {});

        assert_eq!(handle.wait().await, RevealOutcome::Cancelled { ticks: 0 });
        assert_eq!(last_text(&session).await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn aborts_when_assistant_turn_disappears() {
        let session = Arc::new(Mutex::new(SessionState::new(5)));
        session.lock().await.append(ChatTurn::user("Selam"));

        let outcome = RevealScheduler::default()
            .run(session, "x", CancellationToken::new(), None).await;
        assert!(matches!(outcome, RevealOutcome::Aborted { ticks: 0, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn on_finish_receives_outcome() {
        let session = session_with_pending();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = RevealScheduler::default().spawn(session, "ok".into(), CancellationToken::new(), move |outcome| async move {
            let _ = tx.send(outcome);
        });

        assert_eq!(rx.await.unwrap(), RevealOutcome::Completed { ticks: 2 });
        assert!(handle.wait().await.is_completed());
    }
}
