/// Which endpoint produced the most recently parsed message. Used to
/// pick the relevant override slot and the next transition out of
/// `UpdateMessages`, per spec.md §4.2's state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Origin,
}

/// States of the per-connection engine, matching spec.md §4.2's table
/// one-for-one. `AwaitConnection` itself is driven by the accept loop
/// in `Engine::run`, not by `drive_session` — a session only exists
/// once a connection has been accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ReadFromClient,
    AwaitGate,
    UpdateMessages,
    ConnectToOrigin,
    SendToOrigin,
    ReadFromOrigin,
    SendToClient,
}
