use serde::Serialize;
use url::Url;

use super::markdown::{escape_text, render_markdown};
use super::RenderOptions;
use crate::api::{ChatMessage, OutgoingMessage, Role};
use crate::error::AppError;

/// Placeholder text shown while the assistant is working.
pub const TYPING_TEXT: &str = "Typing...";

pub fn avatar(role: Role) -> &'static str {
    match role {
        Role::User => "👤",
        Role::Assistant => "🌿",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BubbleState {
    /// Server data, or a local echo that needs no further change.
    Settled,
    /// The "typing" placeholder for a reply that has not arrived.
    Pending,
    /// A placeholder that ended in a failure notice.
    Failed,
}

/// One rendered message in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bubble {
    /// `msg-<id>` for server messages, `local-<uuid>` for optimistic views.
    pub key: String,
    pub role: Role,
    /// Plain text of the message, for text front-ends.
    pub text: String,
    /// Sanitized HTML for the bubble body.
    pub body_html: String,
    /// Absolute (or `data:`) image URLs.
    pub images: Vec<String>,
    pub state: BubbleState,
}

impl Bubble {
    /// Render one server message. Markdown for the assistant, literal text for
    /// the user. Unreadable image metadata is logged and dropped.
    pub fn from_message(message: &ChatMessage, options: &RenderOptions) -> Self {
        let text = message.text().to_string();
        let body_html = match message.role {
            Role::Assistant => render_markdown(&text),
            Role::User => escape_text(&text),
        };

        let images = match message.image_paths() {
            Ok(paths) => paths
                .iter()
                .filter_map(|p| match resolve_asset(&options.asset_base, p) {
                    Ok(url) => Some(url.to_string()),
                    Err(e) => {
                        tracing::warn!(
                            message_id = %message.id,
                            path = %p,
                            "Skipping image: {}",
                            e
                        );
                        None
                    }
                })
                .collect(),
            Err(e) => {
                tracing::warn!(message_id = %message.id, "Malformed image metadata: {}", e);
                Vec::new()
            }
        };

        Self {
            key: format!("msg-{}", message.id),
            role: message.role,
            text,
            body_html,
            images,
            state: BubbleState::Settled,
        }
    }

    /// View-only echo of a message that has not been confirmed by the service.
    pub fn local_echo(message: &OutgoingMessage) -> Self {
        Self {
            key: local_key(),
            role: Role::User,
            text: message.content.clone(),
            body_html: escape_text(&message.content),
            images: message.images.iter().map(|i| i.preview_url()).collect(),
            state: BubbleState::Settled,
        }
    }

    pub fn pending() -> Self {
        Self {
            key: local_key(),
            role: Role::Assistant,
            text: TYPING_TEXT.to_string(),
            body_html: escape_text(TYPING_TEXT),
            images: Vec::new(),
            state: BubbleState::Pending,
        }
    }

    /// Fill a placeholder with the assistant's reply.
    pub fn settle(&mut self, reply: &str) {
        self.text = reply.to_string();
        self.body_html = render_markdown(reply);
        self.state = BubbleState::Settled;
    }

    pub fn fail(&mut self, notice: &str) {
        self.text = notice.to_string();
        self.body_html = escape_text(notice);
        self.state = BubbleState::Failed;
    }

    pub fn to_html(&self, image_max_width: u32) -> String {
        let role = match self.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let state = match self.state {
            BubbleState::Settled => "",
            BubbleState::Pending => " pending",
            BubbleState::Failed => " failed",
        };

        let mut out = format!(
            "<div class=\"message {role}{state}\" data-key=\"{}\"><div class=\"avatar\">{}</div><div class=\"bubble\">{}",
            escape_text(&self.key),
            avatar(self.role),
            self.body_html,
        );
        for src in &self.images {
            out.push_str(&format!(
                "<img class=\"attachment\" src=\"{}\" style=\"max-width:{}px;height:auto\" alt=\"attachment\">",
                escape_text(src),
                image_max_width,
            ));
        }
        out.push_str("</div></div>");
        out
    }
}

fn local_key() -> String {
    format!("local-{}", uuid::Uuid::new_v4())
}

/// Resolve an attachment path against the service base URL, keeping any path
/// prefix the base carries. Only http(s) URLs are produced.
pub fn resolve_asset(base: &Url, path: &str) -> Result<Url, AppError> {
    let path = path.trim();
    let url = match Url::parse(path) {
        Ok(absolute) => absolute,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let joined = format!(
                "{}/{}",
                base.as_str().trim_end_matches('/'),
                path.trim_start_matches('/')
            );
            Url::parse(&joined)
                .map_err(|e| AppError::Validation(format!("bad image path '{path}': {e}")))?
        }
        Err(e) => {
            return Err(AppError::Validation(format!("bad image path '{path}': {e}")));
        }
    };

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::Validation(format!(
            "image URL scheme '{other}' is not allowed"
        ))),
    }
}

/// Render a message list into bubbles, oldest first.
pub fn render_messages(messages: &[ChatMessage], options: &RenderOptions) -> Vec<Bubble> {
    messages
        .iter()
        .map(|m| Bubble::from_message(m, options))
        .collect()
}

// ============================================================================
// Transcript
// ============================================================================

/// The displayed conversation. Authoritative renders replace everything;
/// optimistic bubbles are appended and discarded by the next full render.
#[derive(Debug, Clone)]
pub struct Transcript {
    bubbles: Vec<Bubble>,
    scroll_anchor: Option<usize>,
    options: RenderOptions,
}

impl Transcript {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            bubbles: Vec::new(),
            scroll_anchor: None,
            options,
        }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Total re-render from server data.
    pub fn replace_all(&mut self, messages: &[ChatMessage]) {
        self.bubbles = render_messages(messages, &self.options);
        self.scroll_to_end();
    }

    /// Append a bubble and return its key.
    pub fn push(&mut self, bubble: Bubble) -> String {
        let key = bubble.key.clone();
        self.bubbles.push(bubble);
        self.scroll_to_end();
        key
    }

    /// Apply `f` to the bubble with `key`. Returns false when it is gone
    /// (e.g. a full re-render already replaced it).
    pub fn update(&mut self, key: &str, f: impl FnOnce(&mut Bubble)) -> bool {
        match self.bubbles.iter_mut().find(|b| b.key == key) {
            Some(bubble) => {
                f(bubble);
                self.scroll_to_end();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.bubbles.len();
        self.bubbles.retain(|b| b.key != key);
        self.scroll_to_end();
        self.bubbles.len() != before
    }

    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    pub fn len(&self) -> usize {
        self.bubbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }

    /// Index of the bubble the view should be scrolled to (the newest one).
    pub fn scroll_anchor(&self) -> Option<usize> {
        self.scroll_anchor
    }

    fn scroll_to_end(&mut self) {
        self.scroll_anchor = self.bubbles.len().checked_sub(1);
    }

    pub fn to_html(&self) -> String {
        self.bubbles
            .iter()
            .map(|b| b.to_html(self.options.image_max_width))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ImageAttachment;
    use proptest::prelude::*;

    fn options() -> RenderOptions {
        RenderOptions {
            asset_base: Url::parse("http://localhost:3000").unwrap(),
            image_max_width: 240,
        }
    }

    fn msg(id: u32, role: Role, content: &str, image_path: Option<&str>) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            role,
            content: Some(content.to_string()),
            image_path: image_path.map(|p| serde_json::Value::String(p.to_string())),
        }
    }

    #[test]
    fn test_rerender_replaces_instead_of_appending() {
        let messages = vec![
            msg(1, Role::User, "what can I cook?", None),
            msg(2, Role::Assistant, "Try *pho*", None),
        ];
        let mut t = Transcript::new(options());
        t.replace_all(&messages);
        let first = t.to_html();
        t.replace_all(&messages);
        assert_eq!(t.len(), 2);
        assert_eq!(t.to_html(), first);
        assert_eq!(t.scroll_anchor(), Some(1));
    }

    #[test]
    fn test_user_script_is_escaped() {
        let b = Bubble::from_message(
            &msg(1, Role::User, "<script>alert(1)</script>", None),
            &options(),
        );
        assert!(!b.body_html.contains("<script"));
        assert!(b.body_html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_markdown_only_for_assistant() {
        let a = Bubble::from_message(&msg(1, Role::Assistant, "**bold**", None), &options());
        let u = Bubble::from_message(&msg(2, Role::User, "**bold**", None), &options());
        assert!(a.body_html.contains("<strong>bold</strong>"));
        assert!(u.body_html.contains("**bold**"));
        assert!(!u.body_html.contains("<strong>"));
    }

    #[test]
    fn test_images_resolved_against_base() {
        let b = Bubble::from_message(
            &msg(3, Role::User, "", Some("[\"uploads/fridge.jpg\"]")),
            &options(),
        );
        assert_eq!(b.images, vec!["http://localhost:3000/uploads/fridge.jpg"]);
        let html = b.to_html(240);
        assert!(html.contains("<img class=\"attachment\""));
        assert!(html.contains("max-width:240px"));
    }

    #[test]
    fn test_asset_keeps_base_path_prefix() {
        let base = Url::parse("https://pantry.example.com/smartpantry/").unwrap();
        assert_eq!(
            resolve_asset(&base, "uploads/a.png").unwrap().as_str(),
            "https://pantry.example.com/smartpantry/uploads/a.png"
        );
        assert_eq!(
            resolve_asset(&base, "/uploads/a.png").unwrap().as_str(),
            "https://pantry.example.com/smartpantry/uploads/a.png"
        );
        let bare = Url::parse("https://pantry.example.com/smartpantry").unwrap();
        assert_eq!(
            resolve_asset(&bare, "uploads/a.png").unwrap().as_str(),
            "https://pantry.example.com/smartpantry/uploads/a.png"
        );
    }

    #[test]
    fn test_asset_rejects_non_http_schemes() {
        let base = Url::parse("https://pantry.example.com/smartpantry").unwrap();
        assert!(resolve_asset(&base, "javascript:alert(1)").is_err());
        assert!(resolve_asset(&base, "data:image/png;base64,AAAA").is_err());
        assert_eq!(
            resolve_asset(&base, "https://cdn.example.com/x.jpg").unwrap().as_str(),
            "https://cdn.example.com/x.jpg"
        );

        let b = Bubble::from_message(
            &msg(4, Role::User, "", Some("[\"javascript:alert(1)\",\"uploads/b.jpg\"]")),
            &options(),
        );
        assert_eq!(b.images, vec!["http://localhost:3000/uploads/b.jpg"]);
    }

    #[test]
    fn test_malformed_images_do_not_break_rendering() {
        let messages = vec![
            msg(1, Role::User, "first", Some("{broken")),
            msg(2, Role::Assistant, "second", None),
        ];
        let mut t = Transcript::new(options());
        t.replace_all(&messages);
        assert_eq!(t.len(), 2);
        assert_eq!(t.bubbles()[0].text, "first");
        assert!(t.bubbles()[0].images.is_empty());
    }

    #[test]
    fn test_placeholder_lifecycle() {
        let mut t = Transcript::new(options());
        let image = ImageAttachment::new("a.png", vec![1, 2]);
        let echo = OutgoingMessage::new("hi", vec![image]).unwrap();
        t.push(Bubble::local_echo(&echo));
        let key = t.push(Bubble::pending());
        assert_eq!(t.bubbles()[1].state, BubbleState::Pending);
        assert!(t.bubbles()[0].images[0].starts_with("data:image/png;base64,"));

        assert!(t.update(&key, |b| b.settle("hello")));
        assert_eq!(t.bubbles()[1].text, "hello");
        assert_eq!(t.bubbles()[1].state, BubbleState::Settled);

        assert!(t.remove(&key));
        assert!(!t.update(&key, |b| b.fail("x")));
        assert_eq!(t.scroll_anchor(), Some(0));
    }

    #[test]
    fn test_full_render_discards_optimistic_bubbles() {
        let mut t = Transcript::new(options());
        let echo = OutgoingMessage::new("hi", Vec::new()).unwrap();
        t.push(Bubble::local_echo(&echo));
        t.push(Bubble::pending());
        t.replace_all(&[msg(1, Role::User, "hi", None)]);
        assert_eq!(t.len(), 1);
        assert_eq!(t.bubbles()[0].key, "msg-1");
    }

    #[test]
    fn test_empty_transcript() {
        let mut t = Transcript::new(options());
        t.replace_all(&[]);
        assert!(t.is_empty());
        assert_eq!(t.scroll_anchor(), None);
        assert_eq!(t.to_html(), "");
    }

    proptest! {
        #[test]
        fn prop_user_content_never_produces_markup(content in ".*") {
            let b = Bubble::from_message(&msg(1, Role::User, &content, None), &options());
            prop_assert!(!b.body_html.contains('<'));
            prop_assert!(!b.body_html.contains('>'));
        }

        #[test]
        fn prop_rerender_is_idempotent(
            entries in proptest::collection::vec((any::<bool>(), "[a-z *<>_#]{0,24}"), 0..8)
        ) {
            let messages: Vec<ChatMessage> = entries
                .iter()
                .enumerate()
                .map(|(i, (assistant, text))| {
                    let role = if *assistant { Role::Assistant } else { Role::User };
                    msg(i as u32, role, text, None)
                })
                .collect();
            let mut t = Transcript::new(options());
            t.replace_all(&messages);
            let once = t.to_html();
            t.replace_all(&messages);
            prop_assert_eq!(t.len(), messages.len());
            prop_assert_eq!(t.to_html(), once);
        }
    }
}
