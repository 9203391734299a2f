use serde::Serialize;
use tokio::sync::broadcast;

use super::poller::PollState;
use crate::render::Bubble;

/// Buffered events per subscriber before slow readers start lagging.
const EVENT_CAPACITY: usize = 64;

/// Changes a front-end needs to redraw a thread view.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewEvent {
    TitleChanged {
        title: String,
    },
    /// The transcript was rewritten; `bubbles` is the full new content.
    TranscriptChanged {
        bubbles: Vec<Bubble>,
        scroll_anchor: Option<usize>,
    },
    /// A blocking, user-facing notice (validation failures, timeouts).
    Alert {
        message: String,
    },
    PollingChanged {
        state: PollState,
        baseline: Option<usize>,
    },
}

/// Fan-out of view events. Emitting with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ViewEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ViewEvent) {
        let _ = self.tx.send(event);
    }

    pub fn alert(&self, message: impl Into<String>) {
        self.emit(ViewEvent::Alert {
            message: message.into(),
        });
    }
}
