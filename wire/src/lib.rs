//! Wire protocol spoken between the bridge and remote script runtimes.
//!
//! The protocol is newline-terminated ASCII text over TCP. A message is one
//! or more lines grouped under a leading command keyword:
//!
//! ```text
//! runtime -> bridge   GET_BREAKPOINTS\n
//! runtime -> bridge   STOP\n<file>,<line>\n
//! runtime -> bridge   VARIABLES\n<count>\n(<name>\n<value>\n)*count
//! bridge -> runtime   BREAKPOINTS\n(<file>,<line>\n)*END_BREAKPOINTS\n
//! bridge -> runtime   COMMAND\n<STEP_OVER|STEP_IN|CONTINUE>\n
//! ```
//!
//! The crate is designed around the tokio-util codec pattern:
//!
//! - [`RuntimeCodec`] implements `Decoder` for runtime-originated messages
//!   and `Encoder` for bridge-originated ones
//! - decoding buffers partial reads: a line split across two socket reads
//!   decodes identically to one delivered whole, and several messages in a
//!   single read decode as a sequence
//!
//! Malformed input (wrong line count, unparseable integer, unknown keyword)
//! is logged and skipped without terminating the stream; only I/O failures
//! and unbounded lines surface as [`CodecError`].

mod codec;
mod error;
mod message;

pub use codec::RuntimeCodec;
pub use error::CodecError;
pub use message::{
    DebuggerMessage, ExecutionCommand, RuntimeMessage, SourceLocation, Variable,
};

/// Port the bridge listens on for runtime connections.
pub const DEFAULT_RUNTIME_PORT: u16 = 4712;
