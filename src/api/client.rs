use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use serde::de::DeserializeOwned;

use super::sse::{self, FrameStream};
use super::types::*;
use super::ConversationService;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::validation::{require_non_empty, require_valid_id};

/// Upper bound on one event-stream subscription.
const SUBSCRIPTION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60 * 60);

// ============================================================================
// Helpers
// ============================================================================

/// Convert a transport-level failure into `AppError::Http`.
fn http_err(e: impl std::fmt::Display) -> AppError {
    AppError::Http(e.to_string())
}

/// Map a non-2xx response onto the error taxonomy, surfacing the service's
/// own `error` text when it sent one.
async fn status_error(resp: reqwest::Response) -> AppError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::message)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body
            }
        });

    match status {
        reqwest::StatusCode::UNAUTHORIZED => AppError::Auth(format!("login required: {message}")),
        reqwest::StatusCode::NOT_FOUND => AppError::NotFound(message),
        _ => AppError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

// ============================================================================
// ConversationClient
// ============================================================================

/// HTTP client for the SmartPantry REST API. The configured session cookie
/// and any cookies the backend sets are kept in one jar and replayed on every
/// call.
pub struct ConversationClient {
    http: reqwest::Client,
    base_url: String,
}

impl ConversationClient {
    /// Create a client for `config.base_url` with the configured request timeout.
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        config.validate()?;
        let jar = Arc::new(Jar::default());
        if let Some(cookie) = &config.session_cookie {
            jar.add_cookie_str(cookie, &config.parsed_base_url()?);
            tracing::debug!("Session cookie loaded from config");
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .cookie_provider(jar)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_base(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // --------------------------------------------------------------------
    // Private HTTP helpers
    // --------------------------------------------------------------------

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/api{}", self.base_url, path))
    }

    async fn send_checked(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, AppError> {
        let resp = req.send().await.map_err(http_err)?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, AppError> {
        let resp = self.send_checked(req).await?;
        let body = resp.text().await.map_err(http_err)?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_ok(&self, req: reqwest::RequestBuilder) -> Result<(), AppError> {
        self.send_checked(req).await?;
        Ok(())
    }

    // --------------------------------------------------------------------
    // Thread list
    // --------------------------------------------------------------------

    /// `GET /api/threads`
    pub async fn list_threads(&self) -> Result<Vec<Thread>, AppError> {
        let envelope: ThreadsEnvelope = self
            .send_json(self.request(reqwest::Method::GET, "/threads"))
            .await?;
        Ok(envelope.threads)
    }

    /// `POST /api/create-thread` -- returns the new thread id.
    pub async fn create_thread(&self, name: &str) -> Result<String, AppError> {
        let name = require_non_empty("thread name", name)?;
        let req = self
            .request(reqwest::Method::POST, "/create-thread")
            .json(&ThreadNameBody { name: &name });
        let resp: CreateThreadResponse = self.send_json(req).await?;
        let id = resp
            .thread_id
            .ok_or_else(|| AppError::Internal("create-thread response had no thread_id".into()))?;
        tracing::info!(thread_id = %id, "Thread created");
        Ok(id)
    }

    /// `PUT /api/edit-thread/{id}`
    pub async fn rename_thread(&self, thread_id: &str, name: &str) -> Result<(), AppError> {
        require_valid_id("thread id", thread_id)?;
        let name = require_non_empty("thread name", name)?;
        let path = format!("/edit-thread/{}", segment(thread_id));
        let req = self
            .request(reqwest::Method::PUT, &path)
            .json(&ThreadNameBody { name: &name });
        self.send_ok(req).await
    }

    /// `DELETE /api/delete-thread/{id}`
    pub async fn delete_thread(&self, thread_id: &str) -> Result<(), AppError> {
        require_valid_id("thread id", thread_id)?;
        let path = format!("/delete-thread/{}", segment(thread_id));
        self.send_ok(self.request(reqwest::Method::DELETE, &path)).await
    }
}

#[async_trait]
impl ConversationService for ConversationClient {
    async fn get_thread(&self, thread_id: &str) -> Result<Thread, AppError> {
        require_valid_id("thread id", thread_id)?;
        let path = format!("/thread/{}", segment(thread_id));
        let envelope: ThreadEnvelope = self
            .send_json(self.request(reqwest::Method::GET, &path))
            .await?;
        Ok(envelope.thread)
    }

    async fn list_chats(&self, thread_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        require_valid_id("thread id", thread_id)?;
        let path = format!("/thread/{}/chats", segment(thread_id));
        let envelope: ChatsEnvelope = self
            .send_json(self.request(reqwest::Method::GET, &path))
            .await?;
        Ok(envelope.chats)
    }

    async fn send_chat(
        &self,
        thread_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SendChatResponse, AppError> {
        require_valid_id("thread id", thread_id)?;
        let mut form = reqwest::multipart::Form::new().text("content", message.content.clone());
        for image in message.images.iter().take(MAX_IMAGES) {
            let part = reqwest::multipart::Part::bytes(image.bytes.clone())
                .file_name(image.file_name.clone())
                .mime_str(&image.mime_type)
                .map_err(|e| AppError::Validation(format!("bad image type: {e}")))?;
            form = form.part("images", part);
        }

        let path = format!("/thread/{}/send-chat", segment(thread_id));
        let req = self.request(reqwest::Method::POST, &path).multipart(form);
        let resp: SendChatResponse = self.send_json(req).await?;
        tracing::debug!(
            thread_id,
            inline_reply = resp.ai_response.is_some(),
            images = message.images.len(),
            "Message sent"
        );
        Ok(resp)
    }

    async fn subscribe(&self, thread_id: &str) -> Result<FrameStream, AppError> {
        require_valid_id("thread id", thread_id)?;
        let path = format!("/thread/{}/events", segment(thread_id));
        // Long-lived: the client-wide timeout would cut the stream off.
        let req = self
            .request(reqwest::Method::GET, &path)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .timeout(SUBSCRIPTION_TIMEOUT);
        let resp = self.send_checked(req).await?;
        Ok(sse::frames(resp))
    }
}
