//! Basic type definitions for the chat server
//!
//! Provides:
//! - `ClientId`: UUID-based opaque connection identity
//! - `SessionState`: lifecycle state of one client session

use uuid::Uuid;

/// Unique client identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe client identification.
/// Implements Hash and Eq for use as map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a client session
///
/// Transitions only move forward: `Connecting → Active → Disconnecting → Closed`.
/// A session that fails its handshake skips `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, nickname not yet registered
    Connecting,
    /// Registered and relaying lines
    Active,
    /// Leaving the registry and tearing down the socket
    Disconnecting,
    /// Terminal
    Closed,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Active)
                | (Connecting, Disconnecting)
                | (Active, Disconnecting)
                | (Disconnecting, Closed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Disconnecting => "disconnecting",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
