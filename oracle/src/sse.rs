//! Server-sent-event framing for streamed completions.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::wire::ChatChunk;
use crate::{OracleError, OracleProgress};

/// Hard cap on buffered, not-yet-framed bytes.
const MAX_SSE_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Consecutive unparseable payloads tolerated before giving up.
const MAX_SSE_PARSE_ERRORS: usize = 3;

pub(crate) fn find_sse_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a <= b { (a, 2) } else { (b, 4) }),
        (Some(a), None) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

pub(crate) fn drain_next_sse_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_sse_event_boundary(buffer)?;
    let event = buffer[..pos].to_vec();
    buffer.drain(..pos + delim_len);
    Some(event)
}

pub(crate) fn extract_sse_data(event: &str) -> Option<String> {
    let mut data = String::new();
    let mut found = false;

    for line in event.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(mut rest) = line.strip_prefix("data:") {
            if let Some(stripped) = rest.strip_prefix(' ') {
                rest = stripped;
            }
            if found {
                data.push('\n');
            }
            data.push_str(rest);
            found = true;
        }
    }

    found.then_some(data)
}

/// Accumulate a streamed chat completion into its full text.
///
/// Each content delta is forwarded on `progress` as it arrives; a closed
/// progress receiver does not stop accumulation. The stream must end with
/// `[DONE]` or a chunk carrying `finish_reason`; EOF before either is an error.
pub(crate) async fn collect_completion(
    response: reqwest::Response,
    progress: &mpsc::Sender<OracleProgress>,
    idle_timeout: Duration,
) -> Result<String, OracleError> {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut text = String::new();
    let mut parse_errors = 0usize;

    loop {
        let Ok(next) = tokio::time::timeout(idle_timeout, stream.next()).await else {
            return Err(OracleError::StreamInterrupted(format!(
                "no data for {}s",
                idle_timeout.as_secs()
            )));
        };

        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| OracleError::StreamInterrupted(e.to_string()))?;
        buffer.extend_from_slice(&chunk);

        if buffer.len() > MAX_SSE_BUFFER_BYTES {
            return Err(OracleError::StreamInterrupted(
                "SSE buffer exceeded maximum size (4 MiB)".to_string(),
            ));
        }

        while let Some(event) = drain_next_sse_event(&mut buffer) {
            if event.is_empty() {
                continue;
            }
            let Ok(event) = std::str::from_utf8(&event) else {
                return Err(OracleError::MalformedResponse(
                    "invalid UTF-8 in event stream".to_string(),
                ));
            };
            let Some(data) = extract_sse_data(event) else {
                continue;
            };

            if data == "[DONE]" {
                return Ok(text);
            }

            match serde_json::from_str::<ChatChunk>(&data) {
                Ok(chunk) => {
                    parse_errors = 0;
                    let (delta, finished) = chunk.into_delta();
                    if let Some(delta) = delta.filter(|d| !d.is_empty()) {
                        text.push_str(&delta);
                        let _ = progress.send(OracleProgress::Delta(delta)).await;
                    }
                    if finished {
                        return Ok(text);
                    }
                }
                Err(e) => {
                    parse_errors += 1;
                    tracing::warn!(%e, payload_bytes = data.len(), "Invalid SSE JSON payload");
                    if parse_errors >= MAX_SSE_PARSE_ERRORS {
                        return Err(OracleError::MalformedResponse(format!(
                            "invalid stream payload: {e}"
                        )));
                    }
                }
            }
        }
    }

    Err(OracleError::StreamInterrupted(
        "connection closed before stream completed".to_string(),
    ))
}
