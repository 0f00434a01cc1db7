//! Server-Sent Events parsing for streamed provider responses.
//!
//! Buffers bytes, splits on newlines, extracts `data:` payloads and drops
//! comments, empty lines and the `[DONE]` marker. A transport error ends the
//! stream with an `Err` item.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tracing::warn;

use crate::error::LlmError;

/// Parse SSE `data:` payloads out of a byte stream.
///
/// Content left in the buffer when the stream ends is parsed as a final line
/// (Gemini does not always terminate its last event with a blank line).
pub fn parse_sse_lines<S, E>(
    byte_stream: S,
    provider: String,
) -> impl Stream<Item = Result<String, LlmError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false, provider),
        |(mut stream, mut buffer, done, provider)| async move {
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
                        continue;
                    };

                    if let Some(data) = extract_sse_data(line) {
                        return Some((Ok(data), (stream, buffer, false, provider)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        warn!(provider = %provider, "SSE stream read error: {e}");
                        let err = LlmError::Transport {
                            provider: provider.clone(),
                            reason: e.to_string(),
                        };
                        return Some((Err(err), (stream, buffer, true, provider)));
                    }
                    None => {
                        if buffer.is_empty() {
                            return None;
                        }
                        let data = std::str::from_utf8(&buffer)
                            .ok()
                            .and_then(|s| extract_sse_data(s.trim()));
                        buffer.clear();
                        return data.map(|d| (Ok(d), (stream, buffer, true, provider)));
                    }
                }
            }
        },
    )
}

/// Extract the data payload from one SSE line.
fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}
