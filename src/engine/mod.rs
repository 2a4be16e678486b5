//! The proxy engine: a single worker thread driving the per-connection
//! state machine of spec.md §4.2.
//!
//! Grounded on the teacher's `src/bin/demo_server.rs` (accept-loop
//! shape) and `src/hypervisor.rs`/`src/sync_hypervisor.rs` (a
//! long-lived worker object carrying a `running` flag checked between
//! blocking steps, with a `stop()` entry point).
pub mod state;

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::bus::{BusHandle, Event};
use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::gate::{Gate, Overrides};
use crate::http::{validate_replacement_header_block, HttpMessage};
use crate::net;

pub use state::{Side, State};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Session {
    client_stream: TcpStream,
    origin_stream: Option<TcpStream>,
    client_message: Option<HttpMessage>,
    origin_message: Option<HttpMessage>,
    pending_overrides: Option<Overrides>,
    target_host: Option<String>,
    last_read: Side,
    connect_port: u16,
}

enum UpdateOutcome {
    Proceed(State),
    Retry,
}

/// The proxy engine. One `Engine` drives one listening socket; its
/// `run` method is the engine's single long-lived worker thread
/// (spec.md §5) — connections are handled one at a time, never
/// concurrently.
pub struct Engine {
    config: ProxyConfig,
    bus: BusHandle,
    gate: Arc<Gate>,
    running: Arc<AtomicBool>,
    runtime_errors: AtomicU64,
    /// Port dialed for every origin connection. Always 80 outside
    /// tests — spec.md §6 restricts the origin protocol to cleartext
    /// HTTP on port 80, so this is never read from the client's `Host`
    /// header (see `net::resolve_host`). Tests substitute a loopback
    /// server's ephemeral port by constructing `Engine` directly
    /// rather than through `new`.
    connect_port: u16,
}

impl Engine {
    pub fn new(config: ProxyConfig, bus: BusHandle, gate: Arc<Gate>) -> Self {
        Self {
            config,
            bus,
            gate,
            running: Arc::new(AtomicBool::new(true)),
            runtime_errors: AtomicU64::new(0),
            connect_port: 80,
        }
    }

    pub fn gate(&self) -> Arc<Gate> {
        Arc::clone(&self.gate)
    }

    /// A shared handle to the engine's shutdown flag, for callers that
    /// want to observe it without going through `stop()`.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn runtime_error_count(&self) -> u64 {
        self.runtime_errors.load(Ordering::SeqCst)
    }

    /// External shutdown signal (spec.md §4.2.2). Both the accept
    /// loop and a parked gate wait observe this and return.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Binds a listener on `addr` and serves it until `stop()` is
    /// called.
    pub fn run(&self, addr: SocketAddr) -> Result<()> {
        let listener = net::bind_listener(addr, self.config.backlog)?;
        self.serve(listener)
    }

    /// Serves an already-bound listener until `stop()` is called,
    /// emitting `Event::Finished` exactly once on the way out. Exposed
    /// separately from `run` so tests can bind an ephemeral port,
    /// discover its address, and only then start serving it.
    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        listener.set_nonblocking(true).map_err(Error::SocketInit)?;

        while self.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _peer)) => self.drive_session(stream),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    self.bus.log(Error::Accept(e).to_string());
                    self.runtime_errors.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        self.bus.send(Event::Finished);
        Ok(())
    }

    /// Drives one client connection through `ReadFromClient` →
    /// `AwaitGate` → `UpdateMessages` → `ConnectToOrigin` →
    /// `SendToOrigin` → `ReadFromOrigin` → `AwaitGate` →
    /// `UpdateMessages` → `SendToClient`.
    ///
    /// Any step's failure resets the engine to `AwaitConnection`: this
    /// function simply returns, and `Session`'s fields (the client and
    /// possibly the origin `TcpStream`) are dropped, closing whichever
    /// sockets the error table in spec.md §4.2 says should close.
    fn drive_session(&self, client_stream: TcpStream) {
        if let Err(e) = client_stream.set_read_timeout(Some(self.config.read_timeout)) {
            self.log_error("socket init", Error::SocketInit(e));
            return;
        }

        let mut session = Session {
            client_stream,
            origin_stream: None,
            client_message: None,
            origin_message: None,
            pending_overrides: None,
            target_host: None,
            last_read: Side::Client,
            connect_port: self.connect_port,
        };

        let mut state = State::ReadFromClient;
        loop {
            state = match state {
                State::ReadFromClient => match self.read_from_client(&mut session) {
                    Ok(()) => State::AwaitGate,
                    Err(e) => return self.log_error("read from client", e),
                },
                State::AwaitGate => match self.await_gate(&mut session) {
                    Some(()) => State::UpdateMessages,
                    None => return,
                },
                State::UpdateMessages => match self.update_messages(&mut session) {
                    UpdateOutcome::Proceed(next) => next,
                    UpdateOutcome::Retry => State::AwaitGate,
                },
                State::ConnectToOrigin => match self.connect_to_origin(&mut session) {
                    Ok(()) => State::SendToOrigin,
                    Err(e) => return self.log_error("connect to origin", e),
                },
                State::SendToOrigin => match self.send_to_origin(&mut session) {
                    Ok(()) => State::ReadFromOrigin,
                    Err(e) => return self.log_error("send to origin", e),
                },
                State::ReadFromOrigin => match self.read_from_origin(&mut session) {
                    Ok(()) => State::AwaitGate,
                    Err(e) => return self.log_error("read from origin", e),
                },
                State::SendToClient => {
                    if let Err(e) = self.send_to_client(&mut session) {
                        self.log_error("send to client", e);
                    }
                    return;
                }
            };
        }
    }

    fn read_from_client(&self, session: &mut Session) -> Result<()> {
        let bytes = net::read_framed(&mut session.client_stream, self.config.buffer_size)?;
        let message = HttpMessage::parse(&bytes)?;
        if let Some(host) = message.headers.first("Host") {
            self.bus.send(Event::NewHost(host.to_string()));
            session.target_host = Some(host.to_string());
        }
        self.bus.send(Event::ClientMessage {
            headers_text: message.header_block(),
            body: message.body.clone(),
        });
        session.client_message = Some(message);
        session.last_read = Side::Client;
        Ok(())
    }

    fn await_gate(&self, session: &mut Session) -> Option<()> {
        let overrides = self.gate.wait_open(&self.running)?;
        self.bus.send(Event::GateOpened);
        session.pending_overrides = Some(overrides);
        Some(())
    }

    fn update_messages(&self, session: &mut Session) -> UpdateOutcome {
        let overrides = session.pending_overrides.take().unwrap_or_default();
        let relevant = match session.last_read {
            Side::Client => overrides.client,
            Side::Origin => overrides.origin,
        };

        if let Some(over) = relevant {
            let current = match session.last_read {
                Side::Client => session.client_message.as_ref().expect("read before update"),
                Side::Origin => session.origin_message.as_ref().expect("read before update"),
            };

            let unchanged = over.headers_text == current.header_block() && over.body == current.body;
            if !unchanged {
                if !validate_replacement_header_block(&over.headers_text) {
                    self.log_error("update messages", Error::BadReplacement);
                    self.re_emit(session.last_read, current);
                    return UpdateOutcome::Retry;
                }

                let mut candidate = over.headers_text.clone().into_bytes();
                candidate.extend_from_slice(&over.body);

                match HttpMessage::parse(&candidate) {
                    Ok(mut replacement) if replacement.kind() == current.kind() => {
                        replacement.update_content_length();
                        match session.last_read {
                            Side::Client => session.client_message = Some(replacement),
                            Side::Origin => session.origin_message = Some(replacement),
                        }
                    }
                    _ => {
                        self.log_error("update messages", Error::BadReplacement);
                        self.re_emit(session.last_read, current);
                        return UpdateOutcome::Retry;
                    }
                }
            }
        }

        match session.last_read {
            Side::Client => UpdateOutcome::Proceed(State::ConnectToOrigin),
            Side::Origin => UpdateOutcome::Proceed(State::SendToClient),
        }
    }

    fn re_emit(&self, side: Side, message: &HttpMessage) {
        let event = match side {
            Side::Client => Event::ClientMessage {
                headers_text: message.header_block(),
                body: message.body.clone(),
            },
            Side::Origin => Event::OriginMessage {
                headers_text: message.header_block(),
                body: message.body.clone(),
            },
        };
        self.bus.send(event);
    }

    fn connect_to_origin(&self, session: &mut Session) -> Result<()> {
        let host = session
            .target_host
            .clone()
            .ok_or_else(|| Error::Dns("no Host header on client request".to_string()))?;
        let addr = net::resolve_host(&host, session.connect_port)?;
        let stream = net::connect(addr, self.config.read_timeout)?;
        session.origin_stream = Some(stream);
        Ok(())
    }

    fn send_to_origin(&self, session: &mut Session) -> Result<()> {
        use std::io::Write;
        let bytes = session
            .client_message
            .as_ref()
            .expect("client message present before SendToOrigin")
            .serialize();
        let stream = session.origin_stream.as_mut().expect("origin connected before SendToOrigin");
        stream.write_all(&bytes).map_err(Error::Write)
    }

    fn read_from_origin(&self, session: &mut Session) -> Result<()> {
        let stream = session.origin_stream.as_mut().expect("origin connected before ReadFromOrigin");
        let bytes = net::read_framed(stream, self.config.buffer_size)?;
        let message = HttpMessage::parse(&bytes)?;
        self.bus.send(Event::OriginMessage {
            headers_text: message.header_block(),
            body: message.body.clone(),
        });
        if let Some(host) = session.target_host.clone() {
            self.bus.send(Event::NewHost(host));
        }
        session.origin_message = Some(message);
        session.last_read = Side::Origin;
        session.origin_stream = None; // close origin socket, per the state table
        Ok(())
    }

    fn send_to_client(&self, session: &mut Session) -> Result<()> {
        use std::io::Write;
        let bytes = session
            .origin_message
            .as_ref()
            .expect("origin message present before SendToClient")
            .serialize();
        session.client_stream.write_all(&bytes).map_err(Error::Write)
    }

    fn log_error(&self, stage: &str, err: Error) {
        self.bus.log(format!("{stage} failed: {err}"));
        self.runtime_errors.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bus::Bus;
    use std::io::{Read, Write};
    use std::net::TcpListener as StdTcpListener;
    use std::thread;

    /// Starts a one-shot origin server on an ephemeral port: accepts
    /// one connection, reads whatever the client sends, then replies
    /// with `response` and closes. Returns the port to put in `Host`
    /// and a receiver yielding the bytes the origin actually saw.
    fn spawn_origin(response: &'static [u8]) -> (u16, std::sync::mpsc::Receiver<Vec<u8>>) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let n = stream.read(&mut buf).unwrap_or(0);
            let _ = tx.send(buf[..n].to_vec());
            stream.write_all(response).unwrap();
        });
        (port, rx)
    }

    /// Builds an engine whose origin connections dial `connect_port`
    /// instead of the production-fixed port 80. Constructs `Engine`
    /// directly (its fields are private to this module, which includes
    /// this submodule) rather than through `new`, which always fixes
    /// `connect_port` at 80.
    fn spawn_engine(connect_port: u16) -> (Arc<Engine>, SocketAddr, Bus) {
        let (bus_handle, bus) = Bus::new();
        let gate = Arc::new(Gate::new());
        let engine = Arc::new(Engine {
            config: ProxyConfig::default(),
            bus: bus_handle,
            gate,
            running: Arc::new(AtomicBool::new(true)),
            runtime_errors: AtomicU64::new(0),
            connect_port,
        });

        let listener = net::bind_listener("127.0.0.1:0".parse().unwrap(), 3).unwrap();
        let addr = listener.local_addr().unwrap();
        let serving = Arc::clone(&engine);
        thread::spawn(move || {
            let _ = serving.serve(listener);
        });
        (engine, addr, bus)
    }

    #[test]
    fn unedited_get_round_trips_exactly() {
        let (origin_port, _origin_rx) = spawn_origin(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
        let (engine, addr, _bus) = spawn_engine(origin_port);

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(format!("GET / HTTP/1.1\r\nHost: 127.0.0.1:{origin_port}\r\n\r\n").as_bytes())
            .unwrap();

        // operator opens the gate twice, without loading any override
        thread::sleep(Duration::from_millis(50));
        engine.gate().open();
        thread::sleep(Duration::from_millis(50));
        engine.gate().open();

        let mut response = Vec::new();
        client.read_to_end(&mut response).unwrap();
        assert_eq!(response, b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");

        engine.stop();
    }

    #[test]
    fn edited_request_body_updates_content_length_before_forwarding() {
        let (origin_port, origin_rx) = spawn_origin(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
        let (engine, addr, _bus) = spawn_engine(origin_port);

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(
                format!(
                    "POST /x HTTP/1.1\r\nHost: 127.0.0.1:{origin_port}\r\nContent-Length: 3\r\n\r\nabc"
                )
                .as_bytes(),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        engine.gate().load_client_message(
            &format!("POST /x HTTP/1.1\r\nHost: 127.0.0.1:{origin_port}\r\nContent-Length: 3\r\n\r\n"),
            b"abcdef".to_vec(),
        );
        engine.gate().open();

        thread::sleep(Duration::from_millis(50));
        engine.gate().open();

        let mut response = Vec::new();
        client.read_to_end(&mut response).unwrap();
        assert_eq!(response, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");

        let sent_to_origin = origin_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let sent_text = String::from_utf8_lossy(&sent_to_origin);
        assert!(sent_text.contains("Content-Length: 6"));
        assert!(sent_text.ends_with("abcdef"));

        engine.stop();
    }

    #[test]
    fn bad_replacement_reopens_gate_with_original_message() {
        let (origin_port, _origin_rx) = spawn_origin(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
        let (engine, addr, bus) = spawn_engine(origin_port);

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(format!("GET / HTTP/1.1\r\nHost: 127.0.0.1:{origin_port}\r\n\r\n").as_bytes())
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        // missing the final CRLFCRLF terminator: validate_replacement_header_block rejects it
        engine.gate().load_client_message("GET / HTTP/1.1\r\nHost: h\r\n", Vec::new());
        engine.gate().open();

        // the engine re-emits the original message and returns to AwaitGate;
        // draining the bus should show the Error::BadReplacement log line.
        thread::sleep(Duration::from_millis(50));
        let mut saw_bad_replacement = false;
        for event in bus.iter() {
            if let Event::Log(text) = event {
                if text.contains("replacement failed validation") {
                    saw_bad_replacement = true;
                }
            }
        }
        assert!(saw_bad_replacement);

        // operator opens again without an override this time, letting the session proceed
        engine.gate().open();
        // origin round's gate, so SendToClient is reached
        thread::sleep(Duration::from_millis(50));
        engine.gate().open();

        let mut response = Vec::new();
        client.read_to_end(&mut response).unwrap();
        assert_eq!(response, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");

        engine.stop();
    }
}
