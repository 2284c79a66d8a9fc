//! Error type for the wire codec.

use std::io;

/// Errors that can occur while encoding or decoding wire messages.
///
/// Malformed message content is not an error: the decoder discards it and
/// moves on to the next line. These variants cover failures of the stream
/// itself.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A line exceeded the configured maximum length without a terminator.
    #[error("line of {length} bytes exceeds maximum allowed {max}")]
    LineTooLong {
        /// Bytes buffered so far for the unterminated line.
        length: usize,
        /// The maximum allowed line length.
        max: usize,
    },
}
