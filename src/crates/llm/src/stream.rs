//! Helpers for turning streamed HTTP bodies into line-oriented events.

use crate::error::{LlmError, Result};
use futures::{Stream, StreamExt};

/// Split a chunked response body into trimmed, non-empty lines.
pub(crate) fn line_stream<S, B>(provider: &'static str, body: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    async_stream::try_stream! {
        let mut buffer: Vec<u8> = Vec::new();
        futures::pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| LlmError::http(provider, e))?;
            buffer.extend_from_slice(chunk.as_ref());
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line).trim().to_string();
                if !text.is_empty() {
                    yield text;
                }
            }
        }
        let rest = String::from_utf8_lossy(&buffer).trim().to_string();
        if !rest.is_empty() {
            yield rest;
        }
    }
}

/// A server-sent event line, as emitted by OpenAI-compatible gateways.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseLine<'a> {
    Data(&'a str),
    Done,
}

/// Parse one SSE line. Comments, `event:` and `id:` lines yield `None`.
pub(crate) fn parse_sse_line(line: &str) -> Option<SseLine<'_>> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload == "[DONE]" {
        Some(SseLine::Done)
    } else if payload.is_empty() {
        None
    } else {
        Some(SseLine::Data(payload))
    }
}
