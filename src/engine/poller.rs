//! Detects an assistant reply produced out of band after a send (or a load)
//! came back without one.
//!
//! One `ConversationPoller` belongs to one thread view. It runs at most one
//! session at a time; the session is a spawned task bound to a
//! `CancellationToken` so closing the view stops it. Progress is measured by
//! message-list length only: the session ends the first time the list is
//! longer than the baseline recorded at start.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::context::ViewContext;
use super::events::ViewEvent;
use super::push;
use crate::config::NotifierKind;

/// Notice shown when a session gives up before a reply arrived.
pub const STILL_WORKING_TEXT: &str = "Still working on a reply. Reload the thread in a moment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Polling,
    /// New content arrived, or the view was torn down.
    Stopped,
    /// The configured tick or time limit ran out first.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_ticks: Option<u32>,
    pub max_duration: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_ticks: None,
            max_duration: None,
        }
    }
}

impl PollPolicy {
    pub fn exhausted(&self, ticks: u32, elapsed: Duration) -> bool {
        self.max_ticks.is_some_and(|max| ticks >= max)
            || self.max_duration.is_some_and(|max| elapsed >= max)
    }

    pub(crate) fn deadline(&self, started: Instant) -> Option<Instant> {
        self.max_duration.map(|d| started + d)
    }
}

/// Current state plus a generation counter so a finished task never
/// overwrites the state of a newer session.
#[derive(Debug)]
struct Shared {
    state: PollState,
    generation: u64,
}

struct PollingSession {
    baseline_count: usize,
    cancel: CancellationToken,
    handle: Option<JoinHandle<PollState>>,
}

pub struct ConversationPoller {
    ctx: Arc<ViewContext>,
    policy: PollPolicy,
    notifier: NotifierKind,
    shared: Arc<Mutex<Shared>>,
    session: Mutex<Option<PollingSession>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl ConversationPoller {
    pub(crate) fn new(ctx: Arc<ViewContext>, policy: PollPolicy, notifier: NotifierKind) -> Self {
        Self {
            ctx,
            policy,
            notifier,
            shared: Arc::new(Mutex::new(Shared {
                state: PollState::Idle,
                generation: 0,
            })),
            session: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PollState {
        lock(&self.shared).state
    }

    pub fn is_active(&self) -> bool {
        self.state() == PollState::Polling
    }

    /// Baseline of the running session, if any.
    pub fn baseline(&self) -> Option<usize> {
        if !self.is_active() {
            return None;
        }
        lock(&self.session).as_ref().map(|s| s.baseline_count)
    }

    /// Start waiting for the message list to grow past `baseline`.
    /// Returns false (and does nothing) when a session is already running.
    pub fn start(&self, baseline: usize) -> bool {
        let mut session = lock(&self.session);
        let generation = {
            let mut shared = lock(&self.shared);
            if shared.state == PollState::Polling {
                tracing::debug!(
                    thread_id = %self.ctx.thread_id,
                    "Poll already running, ignoring start"
                );
                return false;
            }
            shared.state = PollState::Polling;
            shared.generation += 1;
            shared.generation
        };

        self.ctx.events.emit(ViewEvent::PollingChanged {
            state: PollState::Polling,
            baseline: Some(baseline),
        });
        tracing::info!(
            thread_id = %self.ctx.thread_id,
            baseline,
            notifier = ?self.notifier,
            "Waiting for assistant reply"
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_session(
            self.ctx.clone(),
            self.policy.clone(),
            self.notifier,
            baseline,
            cancel.clone(),
            self.shared.clone(),
            generation,
        ));

        *session = Some(PollingSession {
            baseline_count: baseline,
            cancel,
            handle: Some(handle),
        });
        true
    }

    /// Cancel the running session, if any. Safe to call repeatedly.
    pub fn stop(&self) {
        let Some(session) = lock(&self.session).take() else {
            return;
        };
        session.cancel.cancel();

        let stopped = {
            let mut shared = lock(&self.shared);
            if shared.state == PollState::Polling {
                shared.state = PollState::Stopped;
                shared.generation += 1;
                true
            } else {
                false
            }
        };
        if stopped {
            tracing::debug!(thread_id = %self.ctx.thread_id, "Poll cancelled");
            self.ctx.events.emit(ViewEvent::PollingChanged {
                state: PollState::Stopped,
                baseline: Some(session.baseline_count),
            });
        }
    }

    /// Wait for the current session's task to finish and return how it ended.
    /// `None` when no session was started or it was already awaited.
    pub async fn wait(&self) -> Option<PollState> {
        let handle = lock(&self.session).as_mut().and_then(|s| s.handle.take())?;
        match handle.await {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::error!("Poll task failed: {}", e);
                None
            }
        }
    }
}

impl Drop for ConversationPoller {
    fn drop(&mut self) {
        if let Some(session) = lock(&self.session).take() {
            session.cancel.cancel();
        }
    }
}

async fn run_session(
    ctx: Arc<ViewContext>,
    policy: PollPolicy,
    notifier: NotifierKind,
    baseline: usize,
    cancel: CancellationToken,
    shared: Arc<Mutex<Shared>>,
    generation: u64,
) -> PollState {
    let outcome = match notifier {
        NotifierKind::Polling => poll_loop(&ctx, &policy, baseline, &cancel).await,
        NotifierKind::Push => push::push_loop(&ctx, &policy, baseline, &cancel).await,
    };

    let current = {
        let mut shared = lock(&shared);
        let current = shared.generation == generation;
        if current {
            shared.state = outcome;
        }
        current
    };

    if current {
        if outcome == PollState::TimedOut {
            tracing::warn!(thread_id = %ctx.thread_id, "Gave up waiting for assistant reply");
            ctx.events.alert(STILL_WORKING_TEXT);
        }
        ctx.events.emit(ViewEvent::PollingChanged {
            state: outcome,
            baseline: Some(baseline),
        });
    }
    outcome
}

/// Result of one look at the message list.
pub(crate) enum Check {
    Arrived,
    Pending,
    Cancelled,
}

/// Fetch the message list once; render it if it grew past `baseline`.
/// Fetch failures are logged and treated as "nothing yet".
pub(crate) async fn check_for_reply(
    ctx: &ViewContext,
    baseline: usize,
    cancel: &CancellationToken,
) -> Check {
    let result = tokio::select! {
        _ = cancel.cancelled() => return Check::Cancelled,
        r = ctx.service.list_chats(&ctx.thread_id) => r,
    };

    match result {
        Ok(messages) if messages.len() > baseline => {
            tracing::info!(
                thread_id = %ctx.thread_id,
                count = messages.len(),
                baseline,
                "New message arrived"
            );
            ctx.render_authoritative(&messages);
            Check::Arrived
        }
        Ok(messages) => {
            tracing::trace!(
                thread_id = %ctx.thread_id,
                count = messages.len(),
                "No new message yet"
            );
            Check::Pending
        }
        Err(e) => {
            tracing::warn!(thread_id = %ctx.thread_id, "Poll tick failed, retrying: {}", e);
            Check::Pending
        }
    }
}

pub(crate) fn ticker(policy: &PollPolicy) -> tokio::time::Interval {
    let mut interval =
        tokio::time::interval_at(Instant::now() + policy.interval, policy.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn poll_loop(
    ctx: &ViewContext,
    policy: &PollPolicy,
    baseline: usize,
    cancel: &CancellationToken,
) -> PollState {
    let started = Instant::now();
    let mut interval = ticker(policy);
    let mut ticks: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return PollState::Stopped,
            _ = interval.tick() => {}
        }
        ticks = ticks.saturating_add(1);

        match check_for_reply(ctx, baseline, cancel).await {
            Check::Arrived | Check::Cancelled => return PollState::Stopped,
            Check::Pending => {}
        }

        if policy.exhausted(ticks, started.elapsed()) {
            return PollState::TimedOut;
        }
    }
}
