//! Error types for the chat server
//!
//! Defines session-level errors, per-recipient delivery errors and
//! file store errors. Uses thiserror for ergonomic error definitions.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Chat server errors
///
/// Covers both fatal errors (bind failure, session teardown) and
/// protocol errors that are reported back to the offending client.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Transport reset, I/O failure or read timeout (ends the session only)
    #[error("connection lost: {0}")]
    ConnectionLost(#[from] io::Error),

    /// Another active session already uses this nickname
    #[error("nickname '{0}' is already taken")]
    NicknameTaken(String),

    /// Nickname rejected during handshake
    #[error("invalid nickname: {0}")]
    InvalidNickname(String),

    /// Listener could not bind (fatal at startup)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Registry actor has stopped (internal channel broken)
    #[error("client registry closed")]
    RegistryClosed,

    /// Malformed or oversize `FILE|name|size` header
    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    /// File store failure while handling an upload
    #[error("file store error: {0}")]
    Store(#[from] StoreError),
}

impl ChatError {
    /// Protocol-level errors are reported to the client; the rest only end the session.
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self,
            ChatError::NicknameTaken(_)
                | ChatError::InvalidNickname(_)
                | ChatError::InvalidUpload(_)
                | ChatError::Store(_)
        )
    }
}

/// Failure to deliver one message to one recipient
///
/// Isolated to that recipient: recorded in the broadcast report
/// and never propagated to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The recipient's outbound channel has been closed
    #[error("recipient channel closed")]
    Closed,

    /// The recipient did not drain its channel within the write timeout
    #[error("recipient write timed out")]
    TimedOut,
}

/// Directory-backed file store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
