use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::events::{EventBus, ViewEvent};
use crate::api::{ChatMessage, ConversationService};
use crate::render::{RenderOptions, Transcript};

/// State shared between a thread view, its send pipeline and its poll task.
///
/// The transcript is the only mutable resource; every writer takes the lock,
/// rewrites, and publishes a full snapshot.
pub(crate) struct ViewContext {
    pub thread_id: String,
    pub service: Arc<dyn ConversationService>,
    pub events: EventBus,
    transcript: Mutex<Transcript>,
    /// Length of the last authoritative message list.
    known_count: AtomicUsize,
}

impl ViewContext {
    pub fn new(
        thread_id: String,
        service: Arc<dyn ConversationService>,
        options: RenderOptions,
    ) -> Self {
        Self {
            thread_id,
            service,
            events: EventBus::new(),
            transcript: Mutex::new(Transcript::new(options)),
            known_count: AtomicUsize::new(0),
        }
    }

    pub fn with_transcript<R>(&self, f: impl FnOnce(&mut Transcript) -> R) -> R {
        let mut transcript = self.transcript.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut transcript)
    }

    pub fn known_count(&self) -> usize {
        self.known_count.load(Ordering::Acquire)
    }

    /// Replace the transcript with server data and publish it.
    pub fn render_authoritative(&self, messages: &[ChatMessage]) {
        self.known_count.store(messages.len(), Ordering::Release);
        self.with_transcript(|t| t.replace_all(messages));
        self.publish_transcript();
    }

    pub fn publish_transcript(&self) {
        let (bubbles, scroll_anchor) =
            self.with_transcript(|t| (t.bubbles().to_vec(), t.scroll_anchor()));
        self.events.emit(ViewEvent::TranscriptChanged {
            bubbles,
            scroll_anchor,
        });
    }
}
