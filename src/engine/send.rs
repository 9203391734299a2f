use serde::Serialize;

use super::context::ViewContext;
use super::poller::ConversationPoller;
use crate::api::{ImageAttachment, OutgoingMessage, SendChatResponse, MAX_IMAGES};
use crate::error::AppError;
use crate::render::Bubble;

/// Shown in the placeholder when the service answered with an error status.
pub const SEND_FAILED_TEXT: &str = "AI failed. Please try again.";
/// Shown in the placeholder when the service could not be reached.
pub const CONNECTION_ERROR_TEXT: &str = "Connection error.";

/// Text and images the user is about to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    text: String,
    images: Vec<ImageAttachment>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Attach an image. Returns false when [`MAX_IMAGES`] are already attached;
    /// the extra image is dropped.
    pub fn attach(&mut self, image: ImageAttachment) -> bool {
        if self.images.len() >= MAX_IMAGES {
            tracing::warn!(file = %image.file_name, "Image limit reached, attachment dropped");
            return false;
        }
        self.images.push(image);
        true
    }

    pub fn images(&self) -> &[ImageAttachment] {
        &self.images
    }

    pub fn remove_image(&mut self, index: usize) -> Option<ImageAttachment> {
        (index < self.images.len()).then(|| self.images.remove(index))
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.images.clear();
    }

    pub fn to_outgoing(&self) -> Result<OutgoingMessage, AppError> {
        OutgoingMessage::new(&self.text, self.images.clone())
    }
}

/// How a send finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendOutcome {
    /// The reply came back inline and is shown in place of the placeholder.
    Replied { reply: String },
    /// No inline reply; `baseline` is the count the running poll session waits on.
    Deferred { baseline: usize },
    /// The placeholder now shows `notice`. Nothing is retried.
    Failed { notice: String, error: String },
}

/// Validate, echo, dispatch, and settle one message.
///
/// Validation failures raise an alert and return `Err` without touching the
/// network. Every other outcome is reported through `SendOutcome`.
pub(crate) async fn send_message(
    ctx: &ViewContext,
    poller: &ConversationPoller,
    composer: &mut Composer,
) -> Result<SendOutcome, AppError> {
    let message = match composer.to_outgoing() {
        Ok(m) => m,
        Err(e) => {
            let notice = match &e {
                AppError::Validation(m) => m.clone(),
                other => other.to_string(),
            };
            ctx.events.alert(notice);
            return Err(e);
        }
    };

    let baseline = ctx.known_count();
    let placeholder = ctx.with_transcript(|t| {
        t.push(Bubble::local_echo(&message));
        t.push(Bubble::pending())
    });
    ctx.publish_transcript();
    composer.clear();

    let outcome = match ctx.service.send_chat(&ctx.thread_id, &message).await {
        Ok(SendChatResponse {
            ai_response: Some(reply),
        }) => {
            ctx.with_transcript(|t| t.update(&placeholder, |b| b.settle(&reply)));
            SendOutcome::Replied { reply }
        }
        Ok(SendChatResponse { ai_response: None }) => {
            ctx.with_transcript(|t| t.remove(&placeholder));
            let baseline = if poller.start(baseline) {
                baseline
            } else {
                // Already waiting on an earlier send; that session's count wins.
                poller.baseline().unwrap_or(baseline)
            };
            SendOutcome::Deferred { baseline }
        }
        Err(e) => {
            let notice = if e.is_transport() {
                CONNECTION_ERROR_TEXT
            } else {
                SEND_FAILED_TEXT
            };
            tracing::warn!(thread_id = %ctx.thread_id, "Send failed: {}", e);
            ctx.with_transcript(|t| t.update(&placeholder, |b| b.fail(notice)));
            SendOutcome::Failed {
                notice: notice.to_string(),
                error: e.to_string(),
            }
        }
    };

    ctx.publish_transcript();
    Ok(outcome)
}
