pub mod markdown;
pub mod transcript;

pub use markdown::{escape_text, render_markdown};
pub use transcript::{avatar, render_messages, Bubble, BubbleState, Transcript};

/// Settings shared by every render of a thread view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Service base URL; attachment paths are resolved against it.
    pub asset_base: url::Url,
    /// Bounded display width for attachments, in CSS pixels.
    pub image_max_width: u32,
}
