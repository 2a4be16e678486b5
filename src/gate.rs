use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::http::normalize_crlf;

/// How often `wait_open` re-checks the shutdown flag while parked on
/// the condvar. Keeps shutdown latency bounded without busy-polling.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An operator-supplied replacement for the next-to-be-forwarded
/// message: raw header text (already CRLF-normalised) plus body
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub headers_text: String,
    pub body: Vec<u8>,
}

/// The pair of override slots snapshotted at one gate-open event. The
/// engine consults whichever side matches `last_read`.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub client: Option<Override>,
    pub origin: Option<Override>,
}

struct GateState {
    closed: bool,
    pending_client_override: Option<Override>,
    pending_origin_override: Option<Override>,
}

/// Single-slot synchronisation primitive between the engine and an
/// operator. The engine parks in `wait_open` until the operator calls
/// `open`; `load_client_message`/`load_origin_message` must be called
/// before `open` to have any effect on that round, exactly as spec.md
/// §4.2.3 requires.
///
/// Grounded on the teacher's `Firecracker::waiting_socket`
/// (`src/firecracker.rs`): an `Arc<(Mutex<_>, Condvar)>` rendezvous
/// with `wait_timeout` rather than a busy-poll loop, per the redesign
/// hint in spec.md §9.
pub struct Gate {
    state: Mutex<GateState>,
    condvar: Condvar,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                closed: true,
                pending_client_override: None,
                pending_origin_override: None,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Loads a replacement for the client-side message. `headers_text`
    /// is normalised (LF → CRLF) before storage.
    pub fn load_client_message(&self, headers_text: &str, body: Vec<u8>) {
        let headers_text = normalize_crlf(headers_text);
        let mut state = self.state.lock().expect("gate mutex poisoned");
        state.pending_client_override = Some(Override { headers_text, body });
    }

    /// Loads a replacement for the origin-side message. `headers_text`
    /// is normalised (LF → CRLF) before storage.
    pub fn load_origin_message(&self, headers_text: &str, body: Vec<u8>) {
        let headers_text = normalize_crlf(headers_text);
        let mut state = self.state.lock().expect("gate mutex poisoned");
        state.pending_origin_override = Some(Override { headers_text, body });
    }

    /// Opens the gate, waking a parked engine. Called from the UI
    /// thread.
    pub fn open(&self) {
        let mut state = self.state.lock().expect("gate mutex poisoned");
        state.closed = false;
        self.condvar.notify_all();
    }

    /// Blocks until the gate opens, then snapshots and clears both
    /// override slots and re-closes the gate. Returns `None` if
    /// `running` flips to `false` before the gate opens (shutdown).
    pub fn wait_open(&self, running: &AtomicBool) -> Option<Overrides> {
        let mut state = self.state.lock().expect("gate mutex poisoned");
        loop {
            if !state.closed {
                let overrides = Overrides {
                    client: state.pending_client_override.take(),
                    origin: state.pending_origin_override.take(),
                };
                state.closed = true;
                return Some(overrides);
            }
            if !running.load(Ordering::SeqCst) {
                return None;
            }
            let (guard, _timeout) = self
                .condvar
                .wait_timeout(state, POLL_INTERVAL)
                .expect("gate mutex poisoned");
            state = guard;
        }
    }

    /// True while no operator has called `open` since the last
    /// consume. Exposed mainly for tests.
    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("gate mutex poisoned").closed
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_closed_with_no_overrides() {
        let gate = Gate::new();
        assert!(gate.is_closed());
    }

    #[test]
    fn open_wakes_a_waiting_engine_with_loaded_overrides() {
        let gate = Arc::new(Gate::new());
        gate.load_client_message("GET / HTTP/1.1\nHost: h\n\n", b"abc".to_vec());

        let running = Arc::new(AtomicBool::new(true));
        let waiter_gate = Arc::clone(&gate);
        let waiter_running = Arc::clone(&running);
        let handle = thread::spawn(move || waiter_gate.wait_open(&waiter_running));

        thread::sleep(Duration::from_millis(20));
        gate.open();

        let overrides = handle.join().unwrap().expect("gate should have opened");
        let client = overrides.client.expect("client override present");
        assert_eq!(client.headers_text, "GET / HTTP/1.1\r\nHost: h\r\n\r\n");
        assert_eq!(client.body, b"abc");
        assert!(overrides.origin.is_none());
        assert!(gate.is_closed(), "gate re-closes after consume");
    }

    #[test]
    fn wait_open_returns_none_on_shutdown() {
        let gate = Gate::new();
        let running = AtomicBool::new(false);
        assert!(gate.wait_open(&running).is_none());
    }

    #[test]
    fn consumed_overrides_do_not_reappear_next_open() {
        let gate = Gate::new();
        gate.load_client_message("GET / HTTP/1.1\r\nHost: h\r\n\r\n", Vec::new());
        gate.open();
        let running = AtomicBool::new(true);
        let first = gate.wait_open(&running).unwrap();
        assert!(first.client.is_some());

        gate.open();
        let second = gate.wait_open(&running).unwrap();
        assert!(second.client.is_none());
    }
}
