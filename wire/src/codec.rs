//! Incremental codec for the runtime wire protocol.
//!
//! The decoder treats the inbound byte stream as an unbounded sequence of
//! newline-terminated lines and only consumes whole messages: if the lines a
//! message needs have not all arrived yet, nothing is consumed and decoding
//! resumes when more bytes are fed. Malformed content is logged and skipped
//! so one bad message cannot poison the stream.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::message::{DebuggerMessage, RuntimeMessage, Variable};

/// Default maximum length of a single line (4 KB).
const DEFAULT_MAX_LINE_LENGTH: usize = 4 * 1024;

/// Upper bound on the declared pair count of a VARIABLES message.
const MAX_VARIABLE_COUNT: usize = 10_000;

/// Codec for the line-oriented runtime protocol.
///
/// Decodes [`RuntimeMessage`]s from the inbound stream and encodes
/// [`DebuggerMessage`]s for the outbound one.
///
/// # Example
///
/// ```ignore
/// use tokio_util::codec::{FramedRead, FramedWrite};
/// use wire::RuntimeCodec;
///
/// let reader = FramedRead::new(read_half, RuntimeCodec::new());
/// let writer = FramedWrite::new(write_half, RuntimeCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeCodec {
    /// Maximum allowed length of an unterminated line before the stream is
    /// considered broken.
    max_line_length: usize,
}

impl RuntimeCodec {
    /// Create a new codec with default settings.
    pub fn new() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Create a new codec with a custom maximum line length.
    ///
    /// A peer that sends more than this many bytes without a newline fails
    /// with [`CodecError::LineTooLong`].
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self { max_line_length }
    }

    /// More bytes are required before a whole message is available.
    ///
    /// Guards against a peer that never terminates its current line.
    fn need_more(&self, src: &BytesMut) -> Result<Option<RuntimeMessage>, CodecError> {
        let tail_start = src
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let length = src.len() - tail_start;
        if length > self.max_line_length {
            return Err(CodecError::LineTooLong {
                length,
                max: self.max_line_length,
            });
        }
        Ok(None)
    }
}

impl Default for RuntimeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RuntimeCodec {
    type Item = RuntimeMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some((keyword_end, after_keyword)) = find_line(src, 0) else {
                return self.need_more(src);
            };

            match trim_cr(&src[..keyword_end]) {
                b"GET_BREAKPOINTS" => {
                    src.advance(after_keyword);
                    return Ok(Some(RuntimeMessage::GetBreakpoints));
                }
                b"STOP" => {
                    let Some((end, next)) = find_line(src, after_keyword) else {
                        return self.need_more(src);
                    };
                    let payload = trim_cr(&src[after_keyword..end]);
                    let parsed = parse_stop(payload);
                    if parsed.is_none() {
                        let payload = lossy(payload);
                        tracing::warn!(%payload, "discarding malformed STOP payload");
                    }
                    src.advance(next);
                    if let Some(message) = parsed {
                        return Ok(Some(message));
                    }
                }
                b"VARIABLES" => {
                    let Some((count_end, after_count)) = find_line(src, after_keyword) else {
                        return self.need_more(src);
                    };
                    let count = parse_count(trim_cr(&src[after_keyword..count_end]));
                    let Some(count) = count.filter(|&n| n <= MAX_VARIABLE_COUNT) else {
                        let payload = lossy(trim_cr(&src[after_keyword..count_end]));
                        tracing::warn!(%payload, "discarding VARIABLES with bad count");
                        src.advance(after_count);
                        continue;
                    };

                    // all 2*count payload lines must be buffered before the
                    // message is consumed
                    let mut cursor = after_count;
                    let mut lines = Vec::with_capacity(count * 2);
                    for _ in 0..count * 2 {
                        let Some((end, next)) = find_line(src, cursor) else {
                            return self.need_more(src);
                        };
                        lines.push((cursor, end));
                        cursor = next;
                    }

                    let variables = collect_pairs(src, &lines);
                    src.advance(cursor);
                    return Ok(Some(RuntimeMessage::Variables(variables)));
                }
                other => {
                    let keyword = lossy(other);
                    tracing::warn!(%keyword, "discarding unknown message");
                    src.advance(after_keyword);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // The stream ended mid-message. Salvage what is unambiguous; in
        // particular a truncated VARIABLES block keeps the pairs that
        // arrived whole.
        let message = salvage_truncated(src);
        src.clear();
        Ok(message)
    }
}

impl Encoder<DebuggerMessage> for RuntimeCodec {
    type Error = CodecError;

    fn encode(&mut self, item: DebuggerMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            DebuggerMessage::Breakpoints(locations) => {
                dst.put_slice(b"BREAKPOINTS\n");
                for location in &locations {
                    dst.put_slice(location.path.as_bytes());
                    dst.put_u8(b',');
                    dst.put_slice(location.line.to_string().as_bytes());
                    dst.put_u8(b'\n');
                }
                dst.put_slice(b"END_BREAKPOINTS\n");
            }
            DebuggerMessage::Command(command) => {
                dst.put_slice(b"COMMAND\n");
                dst.put_slice(command.as_str().as_bytes());
                dst.put_u8(b'\n');
            }
        }
        Ok(())
    }
}

/// Byte range of the next complete line at or after `from`.
///
/// Returns the end of the line content (terminator excluded) and the index
/// just past the terminator.
fn find_line(src: &BytesMut, from: usize) -> Option<(usize, usize)> {
    let offset = src[from..].iter().position(|&b| b == b'\n')?;
    let end = from + offset;
    Some((end, end + 1))
}

/// Strip a trailing carriage return, tolerating CRLF peers.
fn trim_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Parse a `<file>,<line>` STOP payload. The path runs up to the first
/// comma, matching what runtimes emit.
fn parse_stop(payload: &[u8]) -> Option<RuntimeMessage> {
    let text = std::str::from_utf8(payload).ok()?;
    let (path, line) = text.split_once(',')?;
    let line = line.trim().parse().ok()?;
    Some(RuntimeMessage::Stop {
        path: path.to_owned(),
        line,
    })
}

fn parse_count(payload: &[u8]) -> Option<usize> {
    std::str::from_utf8(payload).ok()?.trim().parse().ok()
}

fn collect_pairs(src: &BytesMut, lines: &[(usize, usize)]) -> Vec<Variable> {
    lines
        .chunks_exact(2)
        .map(|pair| Variable {
            name: lossy(trim_cr(&src[pair[0].0..pair[0].1])),
            value: lossy(trim_cr(&src[pair[1].0..pair[1].1])),
        })
        .collect()
}

/// Best-effort parse of the bytes left in the buffer when the stream ends.
///
/// The final unterminated fragment counts as a line here: the peer is gone,
/// so no terminator is coming.
fn salvage_truncated(src: &BytesMut) -> Option<RuntimeMessage> {
    let mut lines: Vec<&[u8]> = src[..].split(|&b| b == b'\n').map(trim_cr).collect();
    if let Some(last) = lines.last() {
        if last.is_empty() {
            lines.pop();
        }
    }

    let (&keyword, payload) = lines.split_first()?;
    match keyword {
        b"GET_BREAKPOINTS" => Some(RuntimeMessage::GetBreakpoints),
        b"STOP" => {
            let message = payload.first().and_then(|p| parse_stop(p));
            if message.is_none() {
                tracing::warn!("discarding STOP truncated at end of stream");
            }
            message
        }
        b"VARIABLES" => {
            let Some(count) = payload.first().and_then(|p| parse_count(p)) else {
                tracing::warn!("discarding VARIABLES truncated at end of stream");
                return None;
            };
            let variables: Vec<Variable> = payload
                .get(1..)
                .unwrap_or_default()
                .chunks_exact(2)
                .take(count)
                .map(|pair| Variable {
                    name: lossy(pair[0]),
                    value: lossy(pair[1]),
                })
                .collect();
            tracing::warn!(
                declared = count,
                parsed = variables.len(),
                "VARIABLES truncated at end of stream"
            );
            Some(RuntimeMessage::Variables(variables))
        }
        other => {
            let keyword = lossy(other);
            tracing::warn!(%keyword, "discarding unknown fragment at end of stream");
            None
        }
    }
}
