//! End-to-end tests driving a [`Session`] with scripted fake runtimes over
//! real TCP sockets.
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use dap::events::{Event, StoppedReason};
use dap::requests::{self, Request, RequestBody};
use dap::responses::ResponseBody;
use dap::types::{Source, SourceBreakpoint};
use session::{Session, SessionState, MAIN_THREAD_ID};

fn init_test_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A scripted stand-in for a remote script runtime.
struct FakeRuntime {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl FakeRuntime {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connecting to session");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let writer = stream.try_clone().unwrap();
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    fn send(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).unwrap();
        self.writer.flush().unwrap();
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("reading line");
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    /// Read one full breakpoint dump, returning the `file,line` entries.
    fn read_dump(&mut self) -> Vec<String> {
        assert_eq!(self.read_line(), "BREAKPOINTS");
        let mut entries = Vec::new();
        loop {
            let line = self.read_line();
            if line == "END_BREAKPOINTS" {
                return entries;
            }
            entries.push(line);
        }
    }

    /// Synchronize with the session: a dump answer proves the connection
    /// is registered and every earlier broadcast has been flushed.
    fn handshake(&mut self) -> Vec<String> {
        self.send("GET_BREAKPOINTS\n");
        self.read_dump()
    }

    fn read_command(&mut self) -> String {
        assert_eq!(self.read_line(), "COMMAND");
        self.read_line()
    }
}

fn initialized_session() -> Session {
    init_test_logger();
    let session = Session::on_port(0).expect("creating session");
    let response = session
        .handle_request(&Request {
            seq: 1,
            body: RequestBody::Initialize(requests::Initialize {
                adapter_id: "asdbg".to_string(),
                lines_start_at_one: true,
            }),
        })
        .expect("initialize response");
    assert!(response.success);
    session.wait_for_event(|event| matches!(event, Event::Initialized));
    session
}

fn set_breakpoints(session: &Session, seq: i64, path: &str, lines: &[usize]) {
    let response = session
        .handle_request(&Request {
            seq,
            body: RequestBody::SetBreakpoints(requests::SetBreakpoints {
                source: Source {
                    name: None,
                    path: Some(PathBuf::from(path)),
                },
                breakpoints: Some(
                    lines
                        .iter()
                        .map(|&line| SourceBreakpoint { line, column: None })
                        .collect(),
                ),
            }),
        })
        .expect("setBreakpoints response");
    assert!(response.success);
}

fn wait_for_connections(session: &Session, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while session.connection_count() != count {
        assert!(Instant::now() < deadline, "runtimes never registered");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn breakpoint_changes_fan_out_to_every_runtime() {
    let session = initialized_session();
    let addr = session.listen_addr().unwrap();

    let mut first = FakeRuntime::connect(addr);
    let mut second = FakeRuntime::connect(addr);
    assert!(first.handshake().is_empty());
    assert!(second.handshake().is_empty());

    set_breakpoints(&session, 2, "a.as", &[5, 9]);

    let expected = vec!["a.as,5".to_string(), "a.as,9".to_string()];
    assert_eq!(first.read_dump(), expected);
    assert_eq!(second.read_dump(), expected);
}

#[test]
fn late_runtime_catches_up_with_a_dump_request() {
    let session = initialized_session();
    set_breakpoints(&session, 2, "a.as", &[5]);
    set_breakpoints(&session, 3, "b.as", &[2]);

    let mut runtime = FakeRuntime::connect(session.listen_addr().unwrap());
    assert_eq!(
        runtime.handshake(),
        vec!["a.as,5".to_string(), "b.as,2".to_string()]
    );
}

#[test]
fn stop_report_surfaces_as_a_stopped_event_and_stack_frame() {
    let session = initialized_session();
    let mut runtime = FakeRuntime::connect(session.listen_addr().unwrap());
    runtime.handshake();

    runtime.send("STOP\nscripts/main.as,12\n");
    let Event::Stopped(body) =
        session.wait_for_event(|event| matches!(event, Event::Stopped(_)))
    else {
        unreachable!();
    };
    assert_eq!(body.reason, StoppedReason::Breakpoint);
    assert_eq!(body.thread_id, MAIN_THREAD_ID);
    assert_eq!(session.state(), SessionState::Stopped);

    let response = session
        .handle_request(&Request {
            seq: 5,
            body: RequestBody::StackTrace(requests::StackTrace {
                thread_id: MAIN_THREAD_ID,
                ..Default::default()
            }),
        })
        .unwrap();
    let Some(ResponseBody::StackTrace(body)) = response.body else {
        panic!("expected stack trace");
    };
    assert_eq!(body.stack_frames[0].name, "scripts/main.as");
    assert_eq!(body.stack_frames[0].line, 12);
}

#[test]
fn variable_snapshot_is_served_back_to_the_editor() {
    let session = initialized_session();
    let mut runtime = FakeRuntime::connect(session.listen_addr().unwrap());
    runtime.handshake();

    runtime.send("STOP\na.as,3\nVARIABLES\n2\nplayer_life\n987\nplayer_damage\n0xFFE0\n");
    session.wait_for_event(|event| matches!(event, Event::Stopped(_)));
    // the snapshot follows the stop on the same connection task, so a
    // round-trip through the dump request orders us after it
    runtime.handshake();

    let response = session
        .handle_request(&Request {
            seq: 6,
            body: RequestBody::Variables(requests::Variables {
                variables_reference: 1,
            }),
        })
        .unwrap();
    let Some(ResponseBody::Variables(body)) = response.body else {
        panic!("expected variables");
    };
    let flat: Vec<_> = body
        .variables
        .iter()
        .map(|variable| (variable.name.as_str(), variable.value.as_str()))
        .collect();
    assert_eq!(flat, [("player_life", "987"), ("player_damage", "0xFFE0")]);
}

#[test]
fn step_request_reaches_the_runtime_and_acknowledges_immediately() {
    let session = initialized_session();
    let mut runtime = FakeRuntime::connect(session.listen_addr().unwrap());
    runtime.handshake();

    runtime.send("STOP\na.as,3\n");
    session.wait_for_event(|event| matches!(event, Event::Stopped(_)));

    let response = session
        .handle_request(&Request {
            seq: 7,
            body: RequestBody::Next(requests::Next {
                thread_id: MAIN_THREAD_ID,
            }),
        })
        .unwrap();
    assert!(response.success);
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(runtime.read_command(), "STEP_OVER");
}

#[test]
fn continue_reports_all_threads_continued() {
    let session = initialized_session();
    let mut runtime = FakeRuntime::connect(session.listen_addr().unwrap());
    runtime.handshake();

    let response = session
        .handle_request(&Request {
            seq: 7,
            body: RequestBody::Continue(requests::Continue {
                thread_id: MAIN_THREAD_ID,
            }),
        })
        .unwrap();
    let Some(ResponseBody::Continue(body)) = response.body else {
        panic!("expected continue response");
    };
    assert_eq!(body.all_threads_continued, Some(true));
    assert_eq!(runtime.read_command(), "CONTINUE");
}

#[test]
fn dropped_runtime_does_not_break_the_rest() {
    let session = initialized_session();
    let addr = session.listen_addr().unwrap();

    let doomed = FakeRuntime::connect(addr);
    let mut survivor = FakeRuntime::connect(addr);
    survivor.handshake();
    wait_for_connections(&session, 2);

    drop(doomed);
    wait_for_connections(&session, 1);

    set_breakpoints(&session, 2, "a.as", &[5]);
    assert_eq!(survivor.read_dump(), vec!["a.as,5".to_string()]);
}

#[test]
fn non_script_breakpoints_are_never_broadcast() {
    let session = initialized_session();
    let mut runtime = FakeRuntime::connect(session.listen_addr().unwrap());
    runtime.handshake();

    let response = session.handle_request(&Request {
        seq: 2,
        body: RequestBody::SetBreakpoints(requests::SetBreakpoints {
            source: Source {
                name: None,
                path: Some(PathBuf::from("README.md")),
            },
            breakpoints: Some(vec![SourceBreakpoint {
                line: 1,
                column: None,
            }]),
        }),
    });
    assert!(response.is_none());

    // a script-file update still goes through and is the next thing read
    set_breakpoints(&session, 3, "a.as", &[5]);
    assert_eq!(runtime.read_dump(), vec!["a.as,5".to_string()]);
}

#[test]
fn disconnect_closes_runtime_connections_and_emits_terminated() {
    let session = initialized_session();
    let mut runtime = FakeRuntime::connect(session.listen_addr().unwrap());
    runtime.handshake();

    let response = session
        .handle_request(&Request {
            seq: 9,
            body: RequestBody::Disconnect(requests::Disconnect::default()),
        })
        .unwrap();
    assert!(response.success);
    session.wait_for_event(|event| matches!(event, Event::Terminated));
    assert_eq!(session.state(), SessionState::Terminated);

    // the socket is torn down: reads drain to EOF
    let mut line = String::new();
    loop {
        line.clear();
        match runtime.reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(e) => panic!("expected EOF, got {e}"),
        }
    }
}
