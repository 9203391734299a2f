//! Client for SmartPantry conversation threads: the REST/SSE service layer,
//! transcript rendering, and a per-thread view that sends messages and waits
//! for replies that arrive after the send returns.

pub mod api;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod render;
pub mod validation;

pub use api::{ConversationClient, ConversationService};
pub use config::{AppConfig, NotifierKind};
pub use engine::{Composer, SendOutcome, ThreadView, ViewEvent, ViewSettings};
pub use error::AppError;
