//! High level debug-session controller.
//!
//! A [`Session`] ties the editor-facing protocol to the runtime wire
//! protocol: editor requests mutate the breakpoint registry and fan out to
//! connected runtimes, runtime STOP/VARIABLES messages feed the execution
//! state the editor queries back.
mod internals;
mod registry;
mod session;
mod state;

pub use registry::BreakpointRegistry;
pub use session::{Session, SessionConfig};
pub use state::{ExecutionStop, SessionState};

/// Id of the single execution thread the bridge models.
pub const MAIN_THREAD_ID: dap::types::ThreadId = 1;
