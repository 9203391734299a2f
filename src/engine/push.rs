//! Push-channel strategy: wait for the thread's event stream to announce a
//! change, then confirm by fetching the message list. If the stream cannot be
//! opened or drops, the rest of the session falls back to interval polling.

use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::context::ViewContext;
use super::poller::{check_for_reply, ticker, Check, PollPolicy, PollState};
use crate::api::FrameStream;
use crate::error::AppError;

enum Step {
    Cancelled,
    Frame(Option<Result<String, AppError>>),
    Tick,
    Deadline,
}

async fn next_frame(frames: &mut Option<FrameStream>) -> Option<Result<String, AppError>> {
    match frames {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub(crate) async fn push_loop(
    ctx: &ViewContext,
    policy: &PollPolicy,
    baseline: usize,
    cancel: &CancellationToken,
) -> PollState {
    let started = Instant::now();
    let deadline = policy.deadline(started);

    let mut frames = tokio::select! {
        _ = cancel.cancelled() => return PollState::Stopped,
        r = ctx.service.subscribe(&ctx.thread_id) => match r {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::warn!(
                    thread_id = %ctx.thread_id,
                    "Push channel unavailable, polling instead: {}",
                    e
                );
                None
            }
        },
    };

    // The reply may have landed before the subscription was open.
    if frames.is_some() {
        match check_for_reply(ctx, baseline, cancel).await {
            Check::Arrived | Check::Cancelled => return PollState::Stopped,
            Check::Pending => {}
        }
    }

    let mut interval = ticker(policy);
    let mut ticks: u32 = 0;

    loop {
        let step = tokio::select! {
            _ = cancel.cancelled() => Step::Cancelled,
            frame = next_frame(&mut frames), if frames.is_some() => Step::Frame(frame),
            _ = interval.tick(), if frames.is_none() => Step::Tick,
            _ = until(deadline) => Step::Deadline,
        };

        match step {
            Step::Cancelled => return PollState::Stopped,
            Step::Deadline => return PollState::TimedOut,
            Step::Frame(Some(Ok(payload))) => {
                tracing::debug!(thread_id = %ctx.thread_id, %payload, "Thread event received");
            }
            Step::Frame(Some(Err(e))) => {
                tracing::warn!(
                    thread_id = %ctx.thread_id,
                    "Push channel failed, polling instead: {}",
                    e
                );
                frames = None;
                interval.reset();
                continue;
            }
            Step::Frame(None) => {
                tracing::warn!(thread_id = %ctx.thread_id, "Push channel closed, polling instead");
                frames = None;
                interval.reset();
                continue;
            }
            Step::Tick => {
                ticks = ticks.saturating_add(1);
            }
        }

        match check_for_reply(ctx, baseline, cancel).await {
            Check::Arrived | Check::Cancelled => return PollState::Stopped,
            Check::Pending => {}
        }

        if policy.exhausted(ticks, started.elapsed()) {
            return PollState::TimedOut;
        }
    }
}
