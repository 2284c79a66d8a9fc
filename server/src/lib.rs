//! Runtime-facing connection management.
//!
//! The bridge is the listening side: script runtimes dial in over TCP and
//! stay connected for the life of the debug session. This crate owns those
//! sockets. [`ConnectionManager::listen`] opens the listener and starts an
//! accept loop; every accepted connection gets its own framed read and write
//! tasks, so one slow or dead runtime can never stall traffic to the others.
//!
//! Decoded inbound messages are delivered on a single channel as [`Inbound`]
//! values tagged with the originating [`ConnectionId`]; mutation of any
//! shared state in response to them belongs upstream.

mod manager;

pub use manager::{ConnectionId, ConnectionManager, Inbound, Listener};
