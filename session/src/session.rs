use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dap::events::Event;
use dap::requests::Request;
use dap::responses::Response;
use server::ConnectionManager;
use tokio::sync::mpsc;

use crate::internals::SessionInternals;
use crate::state::SessionState;

/// Session tunables.
///
/// `port` may be 0 to let the OS pick one (the bound address is available
/// through [`Session::listen_addr`] afterwards).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub port: u16,
    /// File extension (without the dot) of sources the bridge accepts
    /// breakpoints for; compared case-insensitively.
    pub script_extension: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: wire::DEFAULT_RUNTIME_PORT,
            script_extension: "as".to_string(),
        }
    }
}

impl SessionConfig {
    pub(crate) fn is_script_path(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case(self.script_extension.as_str()))
    }
}

/// Synchronous handle over the debug session.
///
/// The handle owns the async machinery: a tokio runtime drives the TCP
/// listener and per-connection tasks, while all session state lives behind
/// one mutex so editor requests and runtime messages interleave safely.
/// Events for the editor (initialized, stopped, terminated) surface on a
/// crossbeam channel.
pub struct Session {
    internals: Arc<Mutex<SessionInternals>>,
    events: crossbeam_channel::Receiver<Event>,
    // owns the listener and connection tasks; dropped last
    _runtime: tokio::runtime::Runtime,
}

impl Session {
    pub fn new() -> eyre::Result<Self> {
        Self::with_config(SessionConfig::default())
    }

    /// A session that will listen for runtimes on `port` once initialized.
    pub fn on_port(port: u16) -> eyre::Result<Self> {
        Self::with_config(SessionConfig {
            port,
            ..Default::default()
        })
    }

    pub fn with_config(config: SessionConfig) -> eyre::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let connections = ConnectionManager::new(inbound_tx);
        let internals = Arc::new(Mutex::new(SessionInternals::new(
            config,
            connections,
            events_tx,
            runtime.handle().clone(),
        )));

        let background = Arc::clone(&internals);
        runtime.spawn(async move {
            while let Some(event) = inbound_rx.recv().await {
                background.lock().unwrap().on_inbound(event);
            }
        });

        Ok(Self {
            internals,
            events: events_rx,
            _runtime: runtime,
        })
    }

    /// Service one editor request, returning the response to send back.
    ///
    /// `None` means the request was deliberately ignored (for example
    /// breakpoints in a non-script file).
    #[tracing::instrument(skip(self))]
    pub fn handle_request(&self, request: &Request) -> Option<Response> {
        self.internals.lock().unwrap().handle_request(request)
    }

    /// Channel of events to forward to the editor.
    pub fn events(&self) -> crossbeam_channel::Receiver<Event> {
        self.events.clone()
    }

    pub fn state(&self) -> SessionState {
        self.internals.lock().unwrap().state
    }

    /// Address of the runtime listener, once the session is initialized.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.internals.lock().unwrap().listen_addr()
    }

    /// Number of currently connected runtimes.
    pub fn connection_count(&self) -> usize {
        self.internals.lock().unwrap().connection_count()
    }

    /// Tear the session down: close the listener, drop every runtime
    /// connection and emit a terminated event. Idempotent.
    pub fn terminate(&self) {
        self.internals.lock().unwrap().terminate();
    }

    /// Block until `pred` matches an event, discarding the rest.
    pub fn wait_for_event<F>(&self, pred: F) -> Event
    where
        F: Fn(&Event) -> bool,
    {
        let mut n = 0;
        loop {
            let event = self
                .events
                .recv_timeout(Duration::from_secs(5))
                .expect("waiting for event");
            if n >= 100 {
                panic!("did not receive expected event");
            }
            if pred(&event) {
                tracing::debug!(?event, "received expected event");
                return event;
            }
            tracing::trace!(?event, "non-matching event");
            n += 1;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.terminate();
    }
}
