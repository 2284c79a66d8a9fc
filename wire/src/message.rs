//! Typed forms of the wire messages.

use std::fmt;

/// A single name/value pair reported by the runtime.
///
/// Values are opaque strings; the runtime does its own formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

/// A `<file>,<line>` location as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: String,
    pub line: usize,
}

/// A message originating from a connected runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeMessage {
    /// The runtime wants the full current breakpoint set.
    GetBreakpoints,
    /// Execution halted at the given location.
    Stop { path: String, line: usize },
    /// The variables visible at the current halt, replacing any prior
    /// report wholesale.
    Variables(Vec<Variable>),
}

/// A message sent by the bridge to connected runtimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebuggerMessage {
    /// Full breakpoint dump, in registry order.
    Breakpoints(Vec<SourceLocation>),
    /// Resume execution in the given mode.
    Command(ExecutionCommand),
}

/// Execution-control verbs understood by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionCommand {
    StepOver,
    StepIn,
    Continue,
}

impl ExecutionCommand {
    /// The keyword used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionCommand::StepOver => "STEP_OVER",
            ExecutionCommand::StepIn => "STEP_IN",
            ExecutionCommand::Continue => "CONTINUE",
        }
    }
}

impl fmt::Display for ExecutionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
