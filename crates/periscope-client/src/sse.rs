//! # Event-stream framer
//!
//! Turns the chunked body of `GET /event` into `data:` payload strings:
//! - Buffers incoming bytes across chunks
//! - Splits on newlines (stripping a trailing `\r`)
//! - Holds back the trailing partial line until the next chunk arrives
//! - Yields the payload of `data:` lines and ignores every other line
//!
//! A read error is yielded once as `Err` and ends the stream. A partial line
//! left in the buffer when the body ends is discarded.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;

use crate::errors::ClientError;

/// Frame a byte stream into SSE `data:` payloads.
pub fn frame_sse_data<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
    E: Into<ClientError> + Send,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        tracing::debug!("skipping non-UTF-8 event line");
                        continue;
                    };

                    if let Some(data) = extract_sse_data(line) {
                        return Some((Ok(data), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => return Some((Err(e.into()), (stream, buffer, true))),
                    None => {
                        if !buffer.is_empty() {
                            tracing::debug!(bytes = buffer.len(), "discarding partial event line at end of stream");
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Extract the payload from an SSE line.
///
/// Returns `None` for comments, blank lines, non-`data` fields, and empty
/// payloads.
fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    if data.is_empty() {
        return None;
    }
    Some(data.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    type Chunk = Result<Bytes, ClientError>;

    async fn collect(chunks: Vec<Chunk>) -> Vec<Result<String, ClientError>> {
        frame_sse_data(futures::stream::iter(chunks)).collect().await
    }

    fn ok(s: &'static str) -> Chunk {
        Ok(Bytes::from(s))
    }

    // ── extract_sse_data ─────────────────────────────────────────────────

    #[test]
    fn extract_data_line() {
        assert_eq!(
            extract_sse_data("data: {\"type\":\"session.created\"}"),
            Some("{\"type\":\"session.created\"}".into())
        );
        assert_eq!(extract_sse_data("data:{}"), Some("{}".into()));
    }

    #[test]
    fn extract_skips_non_data() {
        assert_eq!(extract_sse_data(""), None);
        assert_eq!(extract_sse_data(": keepalive"), None);
        assert_eq!(extract_sse_data("event: message"), None);
        assert_eq!(extract_sse_data("id: 7"), None);
        assert_eq!(extract_sse_data("data: "), None);
    }

    // ── frame_sse_data ───────────────────────────────────────────────────

    #[tokio::test]
    async fn multiple_frames_in_one_chunk() {
        let out = collect(vec![ok("data: {\"a\":1}\n\ndata: {\"b\":2}\n\n")]).await;
        let payloads: Vec<_> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(payloads, ["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn frame_split_across_chunks() {
        let out = collect(vec![ok("data: {\"par"), ok("tial\":true}\n"), ok("\n")]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "{\"partial\":true}");
    }

    #[tokio::test]
    async fn carriage_returns_stripped() {
        let out = collect(vec![ok("data: {\"cr\":true}\r\n\r\n")]).await;
        assert_eq!(out[0].as_ref().unwrap(), "{\"cr\":true}");
    }

    #[tokio::test]
    async fn trailing_partial_line_discarded() {
        let out = collect(vec![ok("data: {\"done\":1}\ndata: {\"cut")]).await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn read_error_yielded_then_stream_ends() {
        let out = collect(vec![
            ok("data: {\"first\":1}\n"),
            Err(ClientError::InvalidUrl("boom".into())),
            ok("data: {\"never\":1}\n"),
        ])
        .await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert_matches!(out[1], Err(ClientError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        assert!(collect(vec![]).await.is_empty());
    }
}
