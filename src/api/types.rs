use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

/// Most image attachments one message may carry.
pub const MAX_IMAGES: usize = 3;

// ============================================================================
// Identifiers
// ============================================================================

/// The backend emits ids as numbers or strings; both are kept as opaque text.
fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Int(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

// ============================================================================
// Threads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ThreadEnvelope {
    pub thread: Thread,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ThreadsEnvelope {
    #[serde(default)]
    pub threads: Vec<Thread>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateThreadResponse {
    #[serde(default, deserialize_with = "optional_id")]
    pub thread_id: Option<String>,
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "opaque_id")] String);

    Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(id)| id))
}

#[derive(Debug, Serialize)]
pub(crate) struct ThreadNameBody<'a> {
    pub name: &'a str,
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn in a thread, as returned by `GET /thread/{id}/chats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    /// JSON-encoded array of server-relative paths (usually a string holding
    /// the array, occasionally the array itself), or null.
    #[serde(default)]
    pub image_path: Option<serde_json::Value>,
}

impl ChatMessage {
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Decode the attachment list. Malformed metadata is an error for this
    /// message only; callers decide whether to skip it.
    pub fn image_paths(&self) -> Result<Vec<String>, AppError> {
        match &self.image_path {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(serde_json::Value::String(raw)) if raw.trim().is_empty() => Ok(Vec::new()),
            Some(serde_json::Value::String(raw)) => Ok(serde_json::from_str(raw)?),
            Some(value @ serde_json::Value::Array(_)) => Ok(serde_json::from_value(value.clone())?),
            Some(other) => Err(AppError::Validation(format!(
                "image_path must be a JSON array, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatsEnvelope {
    #[serde(default)]
    pub chats: Vec<ChatMessage>,
}

/// Response to `POST /thread/{id}/send-chat`. A missing `ai_response` means
/// the reply is being produced out of band.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SendChatResponse {
    #[serde(default)]
    pub ai_response: Option<String>,
}

/// Error payloads carry either `error` or a list of `errors`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

impl ErrorBody {
    pub fn message(self) -> Option<String> {
        self.error
            .or_else(|| self.errors.filter(|e| !e.is_empty()).map(|e| e.join("\n")))
    }
}

// ============================================================================
// Outgoing
// ============================================================================

/// An image picked by the user, sent as one binary multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = guess_mime(&file_name).to_string();
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, AppError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Ok(Self::new(file_name, bytes))
    }

    /// Local preview URL used for the optimistic echo before the upload lands.
    pub fn preview_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

fn guess_mime(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// A validated message ready for dispatch: trimmed text and at most
/// [`MAX_IMAGES`] attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: String,
    pub images: Vec<ImageAttachment>,
}

impl OutgoingMessage {
    pub fn new(content: &str, mut images: Vec<ImageAttachment>) -> Result<Self, AppError> {
        let content = content.trim().to_string();
        if content.is_empty() && images.is_empty() {
            return Err(AppError::Validation(
                "Please enter a message or attach an image".into(),
            ));
        }
        if images.len() > MAX_IMAGES {
            tracing::warn!(
                attached = images.len(),
                "Only the first {} images are sent",
                MAX_IMAGES
            );
            images.truncate(MAX_IMAGES);
        }
        Ok(Self { content, images })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(image_path: serde_json::Value) -> ChatMessage {
        serde_json::from_value(serde_json::json!({
            "id": 7,
            "role": "user",
            "content": null,
            "image_path": image_path,
        }))
        .unwrap()
    }

    #[test]
    fn test_numeric_and_string_ids() {
        let a: Thread = serde_json::from_str(r#"{"id": 12, "name": "Week plan"}"#).unwrap();
        let b: Thread = serde_json::from_str(r#"{"id": "abc", "name": "Snacks"}"#).unwrap();
        assert_eq!(a.id, "12");
        assert_eq!(b.id, "abc");
    }

    #[test]
    fn test_image_path_encoded_string() {
        let msg = message(serde_json::json!("[\"uploads/a.png\",\"uploads/b.jpg\"]"));
        assert_eq!(msg.image_paths().unwrap(), vec!["uploads/a.png", "uploads/b.jpg"]);
        assert_eq!(msg.text(), "");
    }

    #[test]
    fn test_image_path_null_and_missing() {
        assert!(message(serde_json::Value::Null).image_paths().unwrap().is_empty());
        let msg: ChatMessage =
            serde_json::from_str(r#"{"id": 1, "role": "assistant", "content": "hi"}"#).unwrap();
        assert!(msg.image_paths().unwrap().is_empty());
    }

    #[test]
    fn test_image_path_malformed() {
        assert!(message(serde_json::json!("[not json")).image_paths().is_err());
        assert!(message(serde_json::json!(42)).image_paths().is_err());
    }

    #[test]
    fn test_send_response_without_reply() {
        let resp: SendChatResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.ai_response.is_none());
    }

    #[test]
    fn test_create_thread_response_id() {
        let resp: CreateThreadResponse = serde_json::from_str(r#"{"thread_id": 5}"#).unwrap();
        assert_eq!(resp.thread_id.as_deref(), Some("5"));
        let empty: CreateThreadResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.thread_id.is_none());
    }

    #[test]
    fn test_error_body_message() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"errors": ["too short", "no digits"]}"#).unwrap();
        assert_eq!(body.message().as_deref(), Some("too short\nno digits"));
    }

    #[test]
    fn test_outgoing_requires_content_or_image() {
        assert!(matches!(
            OutgoingMessage::new("   ", Vec::new()),
            Err(AppError::Validation(_))
        ));
        let only_image =
            OutgoingMessage::new("", vec![ImageAttachment::new("a.png", vec![1])]).unwrap();
        assert_eq!(only_image.content, "");
    }

    #[test]
    fn test_outgoing_caps_images() {
        let images = (0..4)
            .map(|i| ImageAttachment::new(format!("{i}.jpg"), vec![i as u8]))
            .collect();
        let msg = OutgoingMessage::new("look", images).unwrap();
        assert_eq!(msg.images.len(), 3);
        assert_eq!(msg.images[2].file_name, "2.jpg");
    }

    #[test]
    fn test_preview_url() {
        let img = ImageAttachment::new("photo.PNG", b"abc".to_vec());
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.preview_url(), "data:image/png;base64,YWJj");
    }
}
