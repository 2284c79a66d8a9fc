use std::path::{Path, PathBuf};

use dap::events::{Event, StoppedEventBody, StoppedReason};
use dap::requests::{Request, RequestBody, SetBreakpoints};
use dap::responses::{
    Capabilities, ContinueResponse, Response, ResponseBody, ScopesResponse,
    SetBreakpointsResponse, StackTraceResponse, ThreadsResponse, VariablesResponse,
};
use dap::types::{self, Scope, Source, StackFrame, Thread, Variable};
use server::{ConnectionId, ConnectionManager, Inbound, Listener};
use wire::{DebuggerMessage, ExecutionCommand, RuntimeMessage};

use crate::registry::BreakpointRegistry;
use crate::session::SessionConfig;
use crate::state::{ExecutionStop, SessionState};
use crate::MAIN_THREAD_ID;

/// Variables reference of the single `Locals` scope.
const LOCALS_REFERENCE: types::VariablesReference = 1;

pub(crate) struct SessionInternals {
    pub(crate) state: SessionState,
    config: SessionConfig,
    breakpoints: BreakpointRegistry,
    stopped_at: Option<ExecutionStop>,
    variables: Vec<wire::Variable>,
    connections: ConnectionManager,
    listener: Option<Listener>,
    events: crossbeam_channel::Sender<Event>,
    runtime: tokio::runtime::Handle,
}

impl SessionInternals {
    pub(crate) fn new(
        config: SessionConfig,
        connections: ConnectionManager,
        events: crossbeam_channel::Sender<Event>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            state: SessionState::Uninitialized,
            config,
            breakpoints: BreakpointRegistry::new(),
            stopped_at: None,
            variables: Vec::new(),
            connections,
            listener: None,
            events,
            runtime,
        }
    }

    /// Service one editor request.
    ///
    /// `None` means the request is deliberately left unacknowledged (the
    /// editor sees it as unhandled); a rejection is an unsuccessful
    /// [`Response`].
    pub(crate) fn handle_request(&mut self, request: &Request) -> Option<Response> {
        let seq = request.seq;
        if let RequestBody::Initialize(_) = request.body {
            return Some(self.initialize(seq));
        }

        match self.state {
            SessionState::Uninitialized => {
                return Some(reject(seq, "session is not initialized"));
            }
            SessionState::Terminated => {
                return Some(reject(seq, "session is terminated"));
            }
            _ => {}
        }

        match &request.body {
            RequestBody::Attach(_) => {
                tracing::debug!("attach handshake");
                self.state = SessionState::Attached;
                Some(ack(seq, ResponseBody::Attach))
            }
            RequestBody::SetBreakpoints(args) => self.set_breakpoints(seq, args),
            RequestBody::Threads => Some(ack(
                seq,
                ResponseBody::Threads(ThreadsResponse {
                    threads: vec![Thread {
                        id: MAIN_THREAD_ID,
                        name: "Thread".to_string(),
                    }],
                }),
            )),
            RequestBody::StackTrace(_) => Some(self.stack_trace(seq)),
            RequestBody::Scopes(_) => Some(ack(
                seq,
                ResponseBody::Scopes(ScopesResponse {
                    scopes: vec![Scope {
                        name: "Locals".to_string(),
                        variables_reference: LOCALS_REFERENCE,
                        expensive: false,
                    }],
                }),
            )),
            RequestBody::Variables(_) => Some(ack(
                seq,
                ResponseBody::Variables(VariablesResponse {
                    variables: self
                        .variables
                        .iter()
                        .map(|variable| Variable {
                            name: variable.name.clone(),
                            value: variable.value.clone(),
                            variables_reference: 0,
                        })
                        .collect(),
                }),
            )),
            RequestBody::Next(_) => {
                Some(self.execute(seq, ExecutionCommand::StepOver, ResponseBody::Next))
            }
            RequestBody::StepIn(_) => {
                Some(self.execute(seq, ExecutionCommand::StepIn, ResponseBody::StepIn))
            }
            RequestBody::Continue(_) => Some(self.execute(
                seq,
                ExecutionCommand::Continue,
                ResponseBody::Continue(ContinueResponse {
                    all_threads_continued: Some(true),
                }),
            )),
            RequestBody::Disconnect(_) => {
                self.terminate();
                Some(ack(seq, ResponseBody::Disconnect))
            }
            _ => {
                tracing::warn!("request not handled by the bridge");
                None
            }
        }
    }

    fn initialize(&mut self, seq: types::Seq) -> Response {
        if self.state != SessionState::Uninitialized {
            return reject(seq, "session already initialized");
        }

        let listener = match self.runtime.block_on(self.connections.listen(self.config.port)) {
            Ok(listener) => listener,
            Err(e) => return reject(seq, &format!("opening runtime listener: {e}")),
        };
        tracing::debug!(addr = %listener.local_addr(), "runtime listener open");
        self.listener = Some(listener);
        self.state = SessionState::Initialized;
        self.emit(Event::Initialized);
        ack(seq, ResponseBody::Initialize(capabilities()))
    }

    fn set_breakpoints(&mut self, seq: types::Seq, args: &SetBreakpoints) -> Option<Response> {
        let Some(path) = args.source.path.as_deref() else {
            tracing::warn!("ignoring breakpoints without a source path");
            return None;
        };
        if !self.config.is_script_path(path) {
            tracing::warn!(path = %path.display(), "ignoring breakpoints for non-script file");
            return None;
        }

        let breakpoints = args.breakpoints.clone().unwrap_or_default();
        tracing::debug!(path = %path.display(), count = breakpoints.len(), "replacing breakpoints");
        self.breakpoints
            .replace(path.to_string_lossy().into_owned(), breakpoints.clone());
        self.connections
            .broadcast(DebuggerMessage::Breakpoints(self.breakpoints.to_dump()));

        let acknowledged = breakpoints
            .iter()
            .map(|breakpoint| types::Breakpoint {
                verified: true,
                line: Some(breakpoint.line),
                source: Some(args.source.clone()),
            })
            .collect();
        Some(ack(
            seq,
            ResponseBody::SetBreakpoints(SetBreakpointsResponse {
                breakpoints: acknowledged,
            }),
        ))
    }

    fn stack_trace(&self, seq: types::Seq) -> Response {
        // a single synthetic frame; before the first STOP a sentinel is
        // reported instead of failing the request
        let frame = match &self.stopped_at {
            Some(stop) => StackFrame {
                id: 1,
                name: stop.path.clone(),
                source: Some(Source {
                    name: file_name(&stop.path),
                    path: Some(PathBuf::from(&stop.path)),
                }),
                line: stop.line,
                column: 1,
            },
            None => StackFrame {
                id: 1,
                name: "unknown".to_string(),
                source: None,
                line: 0,
                column: 0,
            },
        };
        ack(
            seq,
            ResponseBody::StackTrace(StackTraceResponse {
                stack_frames: vec![frame],
            }),
        )
    }

    /// Fire a command at every runtime and acknowledge straight away; the
    /// next halt arrives asynchronously as an inbound STOP.
    fn execute(
        &mut self,
        seq: types::Seq,
        command: ExecutionCommand,
        body: ResponseBody,
    ) -> Response {
        tracing::debug!(%command, "broadcasting execution command");
        self.connections.broadcast(DebuggerMessage::Command(command));
        self.state = SessionState::Running;
        ack(seq, body)
    }

    pub(crate) fn terminate(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        tracing::debug!("terminating session");
        self.listener = None;
        self.connections.shutdown();
        self.state = SessionState::Terminated;
        self.emit(Event::Terminated);
    }

    pub(crate) fn on_inbound(&mut self, event: Inbound) {
        match event {
            Inbound::Connected(connection) => {
                tracing::debug!(connection, "runtime connected");
            }
            Inbound::Disconnected(connection) => {
                tracing::debug!(connection, "runtime disconnected");
            }
            Inbound::Message {
                connection,
                message,
            } => self.on_runtime_message(connection, message),
        }
    }

    fn on_runtime_message(&mut self, connection: ConnectionId, message: RuntimeMessage) {
        if self.state == SessionState::Terminated {
            return;
        }
        match message {
            RuntimeMessage::GetBreakpoints => {
                let dump = DebuggerMessage::Breakpoints(self.breakpoints.to_dump());
                if !self.connections.send_to(connection, dump) {
                    tracing::warn!(connection, "breakpoint dump not delivered");
                }
            }
            RuntimeMessage::Stop { path, line } => {
                tracing::debug!(%path, line, "runtime reported a stop");
                self.stopped_at = Some(ExecutionStop { path, line });
                self.state = SessionState::Stopped;
                self.emit(Event::Stopped(StoppedEventBody {
                    reason: StoppedReason::Breakpoint,
                    thread_id: MAIN_THREAD_ID,
                    description: None,
                }));
            }
            RuntimeMessage::Variables(variables) => {
                tracing::debug!(count = variables.len(), "variable snapshot replaced");
                self.variables = variables;
            }
        }
    }

    pub(crate) fn listen_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.as_ref().map(Listener::local_addr)
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.connection_count()
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }
}

fn ack(seq: types::Seq, body: ResponseBody) -> Response {
    Response {
        request_seq: seq,
        success: true,
        message: None,
        body: Some(body),
    }
}

fn reject(seq: types::Seq, message: &str) -> Response {
    tracing::warn!(%message, "rejecting request");
    Response {
        request_seq: seq,
        success: false,
        message: Some(message.to_string()),
        body: None,
    }
}

fn file_name(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// The capability flags the original adapter advertises. Flags only: of
/// these, the bridge functionally implements breakpoints, step/continue,
/// stack traces and variables.
fn capabilities() -> Capabilities {
    Capabilities {
        supports_configuration_done_request: Some(true),
        supports_evaluate_for_hovers: Some(true),
        supports_step_back: Some(true),
        supports_data_breakpoints: Some(true),
        supports_completions_request: Some(true),
        completion_trigger_characters: Some(vec![".".to_string(), "[".to_string()]),
        supports_cancel_request: Some(true),
        supports_breakpoint_locations_request: Some(true),
        supports_step_in_targets_request: Some(true),
        support_suspend_debuggee: Some(true),
        support_terminate_debuggee: Some(true),
        supports_function_breakpoints: Some(true),
        supports_delayed_stack_trace_loading: Some(true),
    }
}
