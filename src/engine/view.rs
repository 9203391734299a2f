use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::context::ViewContext;
use super::events::ViewEvent;
use super::poller::{ConversationPoller, PollPolicy};
use super::send::{send_message, Composer, SendOutcome};
use crate::api::{ChatMessage, ConversationService, Role};
use crate::config::{AppConfig, NotifierKind};
use crate::error::AppError;
use crate::render::{Bubble, RenderOptions};

/// Per-view knobs derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub render: RenderOptions,
    pub poll: PollPolicy,
    pub notifier: NotifierKind,
}

impl ViewSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            render: config.render_options()?,
            poll: config.poll_policy(),
            notifier: config.notifier,
        })
    }
}

/// A thread still waiting on its first reply: it has messages, none of them
/// from the assistant.
pub fn needs_polling(messages: &[ChatMessage]) -> bool {
    !messages.is_empty() && !messages.iter().any(|m| m.role == Role::Assistant)
}

/// One open conversation thread: its transcript, title, and reply poller.
///
/// Dropping the view (or calling [`ThreadView::close`]) cancels any running
/// poll session.
pub struct ThreadView {
    pub(super) ctx: Arc<ViewContext>,
    poller: ConversationPoller,
    title: Mutex<Option<String>>,
}

impl ThreadView {
    /// Create an empty view. Nothing is fetched until [`ThreadView::load`].
    pub fn open(
        service: Arc<dyn ConversationService>,
        thread_id: impl Into<String>,
        settings: ViewSettings,
    ) -> Self {
        let ctx = Arc::new(ViewContext::new(
            thread_id.into(),
            service,
            settings.render,
        ));
        let poller = ConversationPoller::new(ctx.clone(), settings.poll, settings.notifier);
        Self {
            ctx,
            poller,
            title: Mutex::new(None),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.ctx.thread_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.ctx.events.subscribe()
    }

    pub fn title(&self) -> Option<String> {
        self.title.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Fetch the thread and its messages and render them. A thread that is
    /// still waiting on its first reply starts the poller.
    pub async fn load(&self) -> Result<(), AppError> {
        let thread_id = &self.ctx.thread_id;

        let thread = self.ctx.service.get_thread(thread_id).await.map_err(|e| {
            tracing::error!(thread_id = %thread_id, "Failed to load thread: {}", e);
            e
        })?;
        *self.title.lock().unwrap_or_else(|e| e.into_inner()) = Some(thread.name.clone());
        self.ctx.events.emit(ViewEvent::TitleChanged {
            title: thread.name,
        });

        let messages = self.ctx.service.list_chats(thread_id).await.map_err(|e| {
            tracing::error!(thread_id = %thread_id, "Failed to load messages: {}", e);
            e
        })?;
        tracing::debug!(thread_id = %thread_id, count = messages.len(), "Thread loaded");
        self.ctx.render_authoritative(&messages);

        if needs_polling(&messages) {
            self.poller.start(messages.len());
        }
        Ok(())
    }

    /// Send what the composer holds. See [`SendOutcome`].
    pub async fn send(&self, composer: &mut Composer) -> Result<SendOutcome, AppError> {
        send_message(&self.ctx, &self.poller, composer).await
    }

    pub fn poller(&self) -> &ConversationPoller {
        &self.poller
    }

    /// Snapshot of the rendered bubbles.
    pub fn transcript(&self) -> Vec<Bubble> {
        self.ctx.with_transcript(|t| t.bubbles().to_vec())
    }

    pub fn transcript_html(&self) -> String {
        self.ctx.with_transcript(|t| t.to_html())
    }

    /// Stop polling. The view stays readable.
    pub fn close(&self) {
        self.poller.stop();
    }
}

impl Drop for ThreadView {
    fn drop(&mut self) {
        self.poller.stop();
    }
}
