//! Minimal server-sent events framing for the thread event stream.

use futures_util::stream::{BoxStream, StreamExt};

use crate::error::AppError;

/// Stream of `data:` payloads, one item per complete event.
pub type FrameStream = BoxStream<'static, Result<String, AppError>>;

/// Pull every complete event out of `buffer`, leaving any partial event in
/// place. Events are separated by a blank line; multiple `data:` lines in one
/// event are joined with `\n`. Events without data (comments, keep-alives)
/// are dropped. Bytes are decoded only once an event is complete, so a
/// character split across chunks survives.
pub fn drain_events(buffer: &mut Vec<u8>) -> Vec<String> {
    normalize_newlines(buffer);
    let mut events = Vec::new();
    while let Some(end) = buffer.windows(2).position(|w| w == b"\n\n") {
        let raw: Vec<u8> = buffer.drain(..end + 2).collect();
        let block = String::from_utf8_lossy(&raw[..end]);
        let data: Vec<&str> = block
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
            .collect();
        if !data.is_empty() {
            events.push(data.join("\n"));
        }
    }
    events
}

/// `\r\n` becomes `\n`. A trailing `\r` waits for the next chunk.
fn normalize_newlines(buffer: &mut Vec<u8>) {
    let mut normalized = Vec::with_capacity(buffer.len());
    let mut bytes = buffer.iter().copied().peekable();
    while let Some(b) = bytes.next() {
        if b == b'\r' && bytes.peek() == Some(&b'\n') {
            continue;
        }
        normalized.push(b);
    }
    *buffer = normalized;
}

/// Turn a response body into a stream of event payloads.
pub fn frames(response: reqwest::Response) -> FrameStream {
    let body = Box::pin(response.bytes_stream());
    futures_util::stream::unfold(
        (body, Vec::new(), std::collections::VecDeque::new()),
        |(mut body, mut buffer, mut ready)| async move {
            loop {
                if let Some(event) = ready.pop_front() {
                    return Some((Ok(event), (body, buffer, ready)));
                }
                match body.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                        ready.extend(drain_events(&mut buffer));
                    }
                    Some(Err(e)) => {
                        return Some((Err(AppError::Http(e.to_string())), (body, buffer, ready)));
                    }
                    None => return None,
                }
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    #[test]
    fn test_drain_single_event() {
        let mut b = buf("event: chat\ndata: {\"count\":2}\n\n");
        assert_eq!(drain_events(&mut b), vec!["{\"count\":2}"]);
        assert!(b.is_empty());
    }

    #[test]
    fn test_partial_event_is_kept() {
        let mut b = buf("data: one\n\ndata: tw");
        assert_eq!(drain_events(&mut b), vec!["one"]);
        assert_eq!(b, b"data: tw");
        b.extend_from_slice(b"o\n\n");
        assert_eq!(drain_events(&mut b), vec!["two"]);
    }

    #[test]
    fn test_keepalive_and_crlf() {
        let mut b = buf(": ping\r\n\r\ndata:a\r\ndata: b\r\n\r\n");
        assert_eq!(drain_events(&mut b), vec!["a\nb"]);
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut b = buf("data: a\r\n\r");
        assert!(drain_events(&mut b).is_empty());
        b.extend_from_slice(b"\n");
        assert_eq!(drain_events(&mut b), vec!["a"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let whole = "data: phở\n\n".as_bytes();
        let mut b = whole[..9].to_vec();
        assert!(drain_events(&mut b).is_empty());
        b.extend_from_slice(&whole[9..]);
        assert_eq!(drain_events(&mut b), vec!["phở"]);
    }
}
