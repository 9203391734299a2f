//! Interactive `open <thread-id>`: stdin lines go through the composer,
//! transcript changes are printed to stdout as they arrive.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::api::{ConversationClient, ImageAttachment, Role};
use crate::config::AppConfig;
use crate::engine::{Composer, PollState, SendOutcome, ThreadView, ViewEvent, ViewSettings};
use crate::error::AppError;
use crate::render::{avatar, Bubble, BubbleState};

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Quit,
    Image(PathBuf),
    Text(String),
    Empty,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if line == "/quit" || line == "/exit" {
        return Input::Quit;
    }
    if let Some(path) = line.strip_prefix("/image ") {
        return Input::Image(PathBuf::from(path.trim()));
    }
    Input::Text(line.to_string())
}

/// Lines for bubbles that are new or changed since the last call.
fn transcript_updates(printed: &mut HashMap<String, String>, bubbles: &[Bubble]) -> Vec<String> {
    let mut lines = Vec::new();
    for bubble in bubbles {
        if bubble.role == Role::User && bubble.key.starts_with("local-") {
            // The user just typed it.
            printed.insert(bubble.key.clone(), bubble.text.clone());
            continue;
        }
        if printed.get(&bubble.key) == Some(&bubble.text) {
            continue;
        }
        printed.insert(bubble.key.clone(), bubble.text.clone());
        lines.push(format_bubble(bubble));
    }
    lines
}

fn format_bubble(bubble: &Bubble) -> String {
    let mut out = format!("{} {}", avatar(bubble.role), bubble.text);
    if bubble.state == BubbleState::Failed {
        out.push_str(" [failed]");
    }
    for image in &bubble.images {
        if image.starts_with("data:") {
            out.push_str("\n   [image]");
        } else {
            out.push_str(&format!("\n   [image] {image}"));
        }
    }
    out
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<ViewEvent>) {
    let mut printed = HashMap::new();
    loop {
        match events.recv().await {
            Ok(ViewEvent::TitleChanged { title }) => println!("== {title} =="),
            Ok(ViewEvent::TranscriptChanged { bubbles, .. }) => {
                for line in transcript_updates(&mut printed, &bubbles) {
                    println!("{line}");
                }
            }
            Ok(ViewEvent::Alert { message }) => eprintln!("! {message}"),
            Ok(ViewEvent::PollingChanged { state, .. }) => {
                tracing::debug!(?state, "Poll state changed");
                if state == PollState::Polling {
                    eprintln!("(waiting for reply...)");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

pub async fn run(
    client: ConversationClient,
    config: &AppConfig,
    thread_id: &str,
) -> Result<(), AppError> {
    let settings = ViewSettings::from_config(config)?;
    let view = ThreadView::open(Arc::new(client), thread_id, settings);
    let printer = tokio::spawn(print_events(view.subscribe()));

    view.load().await?;
    eprintln!("Type a message and press enter. /image <path> attaches, /quit leaves.");

    let mut composer = Composer::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Image(path) => match ImageAttachment::from_path(&path).await {
                Ok(image) => {
                    if composer.attach(image) {
                        eprintln!(
                            "Attached {} ({} total)",
                            path.display(),
                            composer.images().len()
                        );
                    } else {
                        eprintln!("! Only 3 images can be attached");
                    }
                }
                Err(e) => eprintln!("! Could not read {}: {e}", path.display()),
            },
            Input::Text(text) => {
                composer.set_text(text);
                match view.send(&mut composer).await {
                    Ok(SendOutcome::Failed { error, .. }) => {
                        tracing::debug!(%error, "Send failed");
                    }
                    Ok(_) => {}
                    // Already reported through an alert.
                    Err(AppError::Validation(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
    }

    view.close();
    drop(view);
    if let Err(e) = printer.await {
        tracing::warn!("Event printer ended abnormally: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bubble(key: &str, role: Role, text: &str) -> Bubble {
        Bubble {
            key: key.into(),
            role,
            text: text.into(),
            body_html: text.into(),
            images: Vec::new(),
            state: BubbleState::Settled,
        }
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("  "), Input::Empty);
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(
            parse_input("/image ~/fridge.jpg "),
            Input::Image(PathBuf::from("~/fridge.jpg"))
        );
        assert_eq!(parse_input(" what's for dinner? "), Input::Text("what's for dinner?".into()));
    }

    #[test]
    fn test_updates_print_each_change_once() {
        let mut printed = HashMap::new();
        let first = vec![
            bubble("msg-1", Role::User, "hi"),
            bubble("msg-2", Role::Assistant, "hello"),
        ];
        assert_eq!(transcript_updates(&mut printed, &first).len(), 2);
        assert!(transcript_updates(&mut printed, &first).is_empty());

        // Local echo is skipped; the placeholder prints, then its reply.
        let mut second = first.clone();
        second.push(bubble("local-a", Role::User, "more"));
        second.push(bubble("local-b", Role::Assistant, "Typing..."));
        assert_eq!(transcript_updates(&mut printed, &second), vec!["🌿 Typing...".to_string()]);

        second[3].text = "sure".into();
        assert_eq!(transcript_updates(&mut printed, &second), vec!["🌿 sure".to_string()]);
    }

    #[test]
    fn test_failed_bubble_is_marked() {
        let mut b = bubble("local-b", Role::Assistant, "Connection error.");
        b.state = BubbleState::Failed;
        assert!(format_bubble(&b).ends_with("[failed]"));
    }
}
