//! Scripted in-memory service for engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use url::Url;

use crate::api::{
    ChatMessage, ConversationService, FrameStream, OutgoingMessage, Role, SendChatResponse, Thread,
};
use crate::config::NotifierKind;
use crate::engine::poller::PollPolicy;
use crate::engine::view::ViewSettings;
use crate::error::AppError;
use crate::render::RenderOptions;

pub fn chat(id: u32, role: Role, content: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        role,
        content: Some(content.to_string()),
        image_path: None,
    }
}

pub fn settings(notifier: NotifierKind) -> ViewSettings {
    ViewSettings {
        render: RenderOptions {
            asset_base: Url::parse("http://localhost:3000").unwrap(),
            image_max_width: 240,
        },
        poll: PollPolicy::default(),
        notifier,
    }
}

enum PushScript {
    Unsupported,
    /// Emit these frames, then stay open.
    Frames(Vec<String>),
    /// Emit these frames, then end the stream.
    Closes(Vec<String>),
    /// Emit these frames, then a transport error, then stay open.
    Fails(Vec<String>),
}

/// `list_chats` replays scripted results in order; the last one repeats.
pub struct FakeService {
    thread: Mutex<Result<Thread, ()>>,
    chats: Mutex<VecDeque<Result<Vec<ChatMessage>, ()>>>,
    send: Mutex<Result<SendChatResponse, AppError>>,
    push: Mutex<PushScript>,
    pub list_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub sent: Mutex<Vec<OutgoingMessage>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            thread: Mutex::new(Ok(Thread {
                id: "1".into(),
                name: "Dinner ideas".into(),
            })),
            chats: Mutex::new(VecDeque::from([Ok(Vec::new())])),
            send: Mutex::new(Ok(SendChatResponse::default())),
            push: Mutex::new(PushScript::Unsupported),
            list_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_chats(self, script: Vec<Result<Vec<ChatMessage>, ()>>) -> Self {
        *self.chats.lock().unwrap() = script.into();
        self
    }

    pub fn with_send(self, result: Result<SendChatResponse, AppError>) -> Self {
        *self.send.lock().unwrap() = result;
        self
    }

    pub fn with_frames(self, frames: &[&str]) -> Self {
        *self.push.lock().unwrap() =
            PushScript::Frames(frames.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn with_closing_frames(self, frames: &[&str]) -> Self {
        *self.push.lock().unwrap() =
            PushScript::Closes(frames.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn with_failing_frames(self, frames: &[&str]) -> Self {
        *self.push.lock().unwrap() =
            PushScript::Fails(frames.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn failing_thread(self) -> Self {
        *self.thread.lock().unwrap() = Err(());
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationService for FakeService {
    async fn get_thread(&self, _thread_id: &str) -> Result<Thread, AppError> {
        self.thread
            .lock()
            .unwrap()
            .clone()
            .map_err(|_| AppError::Http("connection refused".into()))
    }

    async fn list_chats(&self, _thread_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.chats.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        next.unwrap_or(Ok(Vec::new()))
            .map_err(|_| AppError::Http("connection reset".into()))
    }

    async fn send_chat(
        &self,
        _thread_id: &str,
        message: &OutgoingMessage,
    ) -> Result<SendChatResponse, AppError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(message.clone());
        match &*self.send.lock().unwrap() {
            Ok(resp) => Ok(resp.clone()),
            Err(AppError::Http(m)) => Err(AppError::Http(m.clone())),
            Err(AppError::Status { status, message }) => Err(AppError::Status {
                status: *status,
                message: message.clone(),
            }),
            Err(other) => Err(AppError::Internal(other.to_string())),
        }
    }

    async fn subscribe(&self, thread_id: &str) -> Result<FrameStream, AppError> {
        match &*self.push.lock().unwrap() {
            PushScript::Unsupported => Err(AppError::Internal(format!(
                "thread {thread_id}: push channel not supported"
            ))),
            PushScript::Frames(frames) => {
                let items: Vec<Result<String, AppError>> =
                    frames.iter().cloned().map(Ok).collect();
                Ok(futures_util::stream::iter(items)
                    .chain(futures_util::stream::pending())
                    .boxed())
            }
            PushScript::Closes(frames) => {
                let items: Vec<Result<String, AppError>> =
                    frames.iter().cloned().map(Ok).collect();
                Ok(futures_util::stream::iter(items).boxed())
            }
            PushScript::Fails(frames) => {
                let mut items: Vec<Result<String, AppError>> =
                    frames.iter().cloned().map(Ok).collect();
                items.push(Err(AppError::Http("stream reset".into())));
                Ok(futures_util::stream::iter(items)
                    .chain(futures_util::stream::pending())
                    .boxed())
            }
        }
    }
}
