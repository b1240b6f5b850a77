//! SSE plumbing shared by provider adapters.
//!
//! An adapter hands a `reqwest::Response` plus a parser closure to
//! [`into_event_stream`]; the [`FrameDecoder`] splits the body into
//! complete SSE frames and extracts their `data:` payloads, tolerating
//! CRLF framing and multi-line data fields.

use wh_domain::error::Result;
use wh_domain::stream::{BoxStream, StreamEvent};

use crate::openai_compat::from_reqwest;

/// Incremental SSE frame decoder.
///
/// Feed raw body chunks with [`push`](Self::push); pull decoded `data:`
/// payloads with [`next_data`](Self::next_data). A frame is complete at a
/// blank line (`\n\n` or `\r\n\r\n`); within a frame, multiple `data:`
/// lines are joined with `\n` and `event:`/`id:`/`retry:`/comment lines
/// are dropped. Anything after the last delimiter stays buffered for the
/// next chunk.
#[derive(Default)]
pub(crate) struct FrameDecoder {
    buf: String,
}

impl FrameDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, chunk: &str) {
        self.buf.push_str(chunk);
    }

    /// Decode the next buffered frame's payload. Frames without data
    /// (heartbeat comments, bare id lines) are consumed and skipped.
    pub(crate) fn next_data(&mut self) -> Option<String> {
        loop {
            let (end, delim_len) = frame_boundary(&self.buf)?;
            let frame: String = self.buf.drain(..end + delim_len).collect();
            if let Some(data) = payload_of(&frame[..end]) {
                return Some(data);
            }
        }
    }

    /// Treat whatever is left as a final, unterminated frame (servers may
    /// close the body right after the last payload).
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        if rest.trim().is_empty() {
            None
        } else {
            payload_of(&rest)
        }
    }
}

/// Position and length of the earliest frame delimiter, LF or CRLF style.
fn frame_boundary(buf: &str) -> Option<(usize, usize)> {
    let lf = buf.find("\n\n").map(|i| (i, 2));
    let crlf = buf.find("\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
        (one, other) => one.or(other),
    }
}

/// Join a frame's `data:` lines; `None` when the frame carries no data.
fn payload_of(frame: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in frame.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue; // SSE comment, e.g. keep-alive
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim());
        }
    }
    let joined = data_lines.join("\n");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Turn an SSE `reqwest::Response` into a [`BoxStream`] of parsed events.
///
/// `parse` maps one data payload to zero or more events and is `FnMut`
/// so parsers may keep reassembly state. If the body ends without the
/// parser ever producing a `Done`, a synthetic one is appended so
/// downstream loops always terminate on a final marker.
pub(crate) fn into_event_stream<P>(
    response: reqwest::Response,
    mut parse: P,
) -> BoxStream<'static, Result<StreamEvent>>
where
    P: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut decoder = FrameDecoder::new();
        let mut saw_done = false;

        'body: loop {
            let payloads: Vec<String> = match response.chunk().await {
                Ok(Some(bytes)) => {
                    decoder.push(&String::from_utf8_lossy(&bytes));
                    std::iter::from_fn(|| decoder.next_data()).collect()
                }
                Ok(None) => {
                    let tail: Vec<String> =
                        std::iter::from_fn(|| decoder.next_data()).collect();
                    let mut all = tail;
                    all.extend(decoder.finish());
                    for data in all {
                        for event in parse(&data) {
                            saw_done |= matches!(&event, Ok(StreamEvent::Done { .. }));
                            yield event;
                        }
                    }
                    break 'body;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break 'body;
                }
            };

            for data in payloads {
                for event in parse(&data) {
                    saw_done |= matches!(&event, Ok(StreamEvent::Done { .. }));
                    yield event;
                }
            }
        }

        if !saw_done {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
