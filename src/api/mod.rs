pub mod client;
pub mod sse;
pub mod types;

use async_trait::async_trait;

use crate::error::AppError;

pub use client::ConversationClient;
pub use sse::FrameStream;
pub use types::*;

/// The slice of the SmartPantry backend a thread view depends on.
///
/// `ConversationClient` is the HTTP implementation; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// `GET /thread/{id}`
    async fn get_thread(&self, thread_id: &str) -> Result<Thread, AppError>;

    /// `GET /thread/{id}/chats`, oldest first.
    async fn list_chats(&self, thread_id: &str) -> Result<Vec<ChatMessage>, AppError>;

    /// `POST /thread/{id}/send-chat`
    async fn send_chat(
        &self,
        thread_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SendChatResponse, AppError>;

    /// Open the thread's push channel. Services without one report an error
    /// and callers fall back to polling.
    async fn subscribe(&self, thread_id: &str) -> Result<FrameStream, AppError> {
        Err(AppError::Internal(format!(
            "thread {thread_id}: push channel not supported"
        )))
    }
}
