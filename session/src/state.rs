/// Debug-session lifecycle.
///
/// Editor requests are serviced between `Initialized` and `Terminated`;
/// `Running` and `Stopped` alternate on step/continue requests and inbound
/// STOP reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Attached,
    Running,
    Stopped,
    Terminated,
}

/// The last halt location reported by a runtime. Overwritten wholesale by
/// each STOP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStop {
    pub path: String,
    pub line: usize,
}
