//! Protocol event definitions

use bytes::Bytes;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Opaque handle for one proxied user session.
///
/// Allocated by the server from a monotonic counter; carried on the wire as
/// decimal text. The value has no meaning beyond identity while the session
/// is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// One complete protocol unit on the tunnel connection.
///
/// The server emits `Connect`/`Disconnect`/`Message` toward the client; the
/// client answers with `Disconnect`/`Message` and periodic `Alive` beats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Session `id` opened on the far side.
    Connect(SessionId),

    /// Session `id` is gone; the receiver tears down its end.
    Disconnect(SessionId),

    /// Raw bytes to relay for session `id`.
    Message { id: SessionId, data: Bytes },

    /// Heartbeat, no payload.
    Alive,
}
