//! Asynchronous one-way notification channel from the engine/explorer
//! to the UI, per spec.md §5/§6.
//!
//! Grounded in the teacher's pattern of passing a cloneable handle
//! into worker code while the owning side keeps the consuming end
//! (`src/pool/mod.rs`'s `Pool(Arc<PoolInner>)` shape), adapted here
//! from an async channel to `std::sync::mpsc` since this crate's
//! workers are blocking threads, not futures.
use std::sync::mpsc::{self, Receiver, Sender};

/// Events posted by the engine and the site explorer. Delivery is
/// queued and order-preserving per sender, per spec.md §5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Log(String),
    ClientMessage { headers_text: String, body: Vec<u8> },
    OriginMessage { headers_text: String, body: Vec<u8> },
    NewHost(String),
    GateOpened,
    Finished,
    SiteTreeUpdated(String),
}

/// A cloneable sending half, held by the engine and the explorer.
#[derive(Clone)]
pub struct BusHandle {
    sender: Sender<Event>,
}

impl BusHandle {
    /// Posts `event`. A UI that has dropped its receiver is not a
    /// protocol error for the sending side — the send is simply
    /// discarded.
    pub fn send(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// Posts a UI-facing `Event::Log`. This is distinct from the `log`
    /// crate's macros: engine and explorer diagnostics go through this
    /// channel because they are meant for the operator's log pane, not
    /// stderr. `log::warn!`/`log::error!` are reserved for the handful
    /// of call sites that run before a `Bus` exists or outside any
    /// session (config validation, CLI startup failures).
    pub fn log(&self, text: impl Into<String>) {
        self.send(Event::Log(text.into()));
    }
}

/// The receiving half, owned by the UI thread.
pub struct Bus {
    receiver: Receiver<Event>,
}

impl Bus {
    pub fn new() -> (BusHandle, Bus) {
        let (sender, receiver) = mpsc::channel();
        (BusHandle { sender }, Bus { receiver })
    }

    /// Blocks until the next event arrives, or returns `None` once
    /// every `BusHandle` has been dropped.
    pub fn recv(&self) -> Option<Event> {
        self.receiver.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.receiver.try_iter()
    }
}
