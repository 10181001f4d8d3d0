//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! `streamGenerateContent?alt=sse` answers with `data: {json}` frames
//! separated by blank lines, each frame holding one
//! [`GenerateContentResponse`] chunk.  This module turns the raw byte stream
//! into a stream of those chunks.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::client::api_error_from_body;
use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_FRAMES};
use crate::types::{ApiErrorBody, GenerateContentResponse};
use crate::{Error, Result};

/// Process a stream of bytes into a stream of response chunks.
///
/// Frames split across network reads (including multi-byte UTF-8 sequences
/// split across reads) are reassembled.  Keep-alive comments and frames
/// without data are skipped.  Any frame left in the buffer when the byte
/// stream ends is still decoded.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<GenerateContentResponse>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let state = SseState {
        stream,
        pending: Vec::new(),
        buffer: String::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some((data, remaining)) = extract_frame(&state.buffer) {
                state.buffer = remaining;
                match data {
                    Some(data) => return Some((parse_frame(&data), state)),
                    None => continue,
                }
            }

            if state.done {
                // Tolerate a final frame that is missing its blank-line terminator.
                let tail = std::mem::take(&mut state.buffer);
                return match frame_data(&tail) {
                    Some(data) => Some((parse_frame(&data), state)),
                    None => None,
                };
            }

            match state.stream.next().await {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    state.pending.extend_from_slice(&bytes);
                    if let Err(err) = state.decode_pending() {
                        STREAM_ERRORS.click();
                        state.done = true;
                        state.buffer.clear();
                        return Some((Err(err), state));
                    }
                }
                Some(Err(e)) => {
                    STREAM_ERRORS.click();
                    return Some((Err(e), state));
                }
                None => {
                    state.done = true;
                    if !state.pending.is_empty() {
                        STREAM_ERRORS.click();
                        state.pending.clear();
                        state.buffer.clear();
                        return Some((
                            Err(Error::encoding("Stream ended inside a UTF-8 sequence", None)),
                            state,
                        ));
                    }
                }
            }
        }
    })
}

struct SseState<S> {
    stream: S,
    pending: Vec<u8>,
    buffer: String,
    done: bool,
}

impl<S> SseState<S> {
    /// Moves every complete UTF-8 sequence from `pending` into `buffer`,
    /// normalizing CRLF line endings.
    fn decode_pending(&mut self) -> Result<()> {
        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(Error::encoding(
                    format!("Invalid UTF-8 in stream: {e}"),
                    Some(Box::new(e)),
                ));
            }
        };
        let rest = self.pending.split_off(valid_up_to);
        let text = std::str::from_utf8(&self.pending)?;
        self.buffer.push_str(text);
        self.pending = rest;
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        Ok(())
    }
}

/// Extract one complete frame from the buffer.
///
/// Returns `None` when no blank-line terminator is present yet; otherwise
/// the frame's data payload (if any) and the remaining buffer.
fn extract_frame(buffer: &str) -> Option<(Option<String>, String)> {
    let (frame, rest) = buffer.split_once("\n\n")?;
    Some((frame_data(frame), rest.to_string()))
}

/// Joins the `data:` lines of a frame; comments and other fields are ignored.
fn frame_data(frame: &str) -> Option<String> {
    let mut data: Option<String> = None;
    for line in frame.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }
    data.filter(|d| !d.trim().is_empty() && d.trim() != "[DONE]")
}

fn parse_frame(data: &str) -> Result<GenerateContentResponse> {
    STREAM_FRAMES.click();
    let value: serde_json::Value = serde_json::from_str(data).map_err(|e| {
        STREAM_ERRORS.click();
        Error::serialization(
            format!("Failed to parse stream chunk: {e}"),
            Some(Box::new(e)),
        )
    })?;
    if value.get("error").is_some() {
        STREAM_ERRORS.click();
        let body: ApiErrorBody = serde_json::from_value(value)?;
        let status_code = body.error.code.unwrap_or(500);
        return Err(api_error_from_body(status_code, body, None));
    }
    let chunk: GenerateContentResponse = serde_json::from_value(value)?;
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::convert::Infallible;

    fn chunks(
        parts: Vec<&'static [u8]>,
    ) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    const HI: &[u8] = b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}],\"role\":\"model\"}}]}\n\n";

    #[tokio::test]
    async fn parse_single_frame() {
        let mut sse = Box::pin(process_sse(chunks(vec![HI])));
        let chunk = sse.next().await.unwrap().unwrap();
        assert_eq!(chunk.text().as_deref(), Some("Hi"));
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn parse_crlf_frames() {
        let data: &'static [u8] = b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\r\n\r\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"b\"}]}}]}\r\n\r\n";
        let mut sse = Box::pin(process_sse(chunks(vec![data])));
        assert_eq!(sse.next().await.unwrap().unwrap().text().as_deref(), Some("a"));
        assert_eq!(sse.next().await.unwrap().unwrap().text().as_deref(), Some("b"));
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn handle_split_frame() {
        let (first, second) = HI.split_at(17);
        let mut sse = Box::pin(process_sse(chunks(vec![first, second])));
        let chunk = sse.next().await.unwrap().unwrap();
        assert_eq!(chunk.text().as_deref(), Some("Hi"));
    }

    #[tokio::test]
    async fn handle_split_utf8_sequence() {
        let frame = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"caf\u{e9}\"}]}}]}\n\n";
        let bytes: &'static [u8] = Box::leak(frame.as_bytes().to_vec().into_boxed_slice());
        let split = frame.find('\u{e9}').unwrap() + 1;
        let (first, second) = bytes.split_at(split);
        let mut sse = Box::pin(process_sse(chunks(vec![first, second])));
        let chunk = sse.next().await.unwrap().unwrap();
        assert_eq!(chunk.text().as_deref(), Some("caf\u{e9}"));
    }

    #[tokio::test]
    async fn skips_comments_and_empty_frames() {
        let parts = vec![&b": keep-alive\n\n"[..], &b"\n\n"[..], HI];
        let mut sse = Box::pin(process_sse(chunks(parts)));
        let chunk = sse.next().await.unwrap().unwrap();
        assert_eq!(chunk.text().as_deref(), Some("Hi"));
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn unterminated_final_frame_is_decoded() {
        let data: &'static [u8] = b"data: {\"candidates\":[{\"finishReason\":\"STOP\"}]}";
        let mut sse = Box::pin(process_sse(chunks(vec![data])));
        let chunk = sse.next().await.unwrap().unwrap();
        assert_eq!(chunk.text(), None);
        assert!(sse.next().await.is_none());
    }

    #[tokio::test]
    async fn handle_malformed_frame() {
        let mut sse = Box::pin(process_sse(chunks(vec![&b"data: {not json\n\n"[..]])));
        let event = sse.next().await.unwrap();
        assert!(matches!(event, Err(Error::Serialization { .. })));
    }

    #[tokio::test]
    async fn error_frame_becomes_api_error() {
        let data: &'static [u8] =
            b"data: {\"error\":{\"code\":503,\"message\":\"The model is overloaded.\",\"status\":\"UNAVAILABLE\"}}\n\n";
        let mut sse = Box::pin(process_sse(chunks(vec![data])));
        let err = sse.next().await.unwrap().unwrap_err();
        assert!(err.is_server_error());
        assert!(err.to_string().contains("overloaded"));
    }
}
