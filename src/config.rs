//! Server configuration
//!
//! `ServerConfig` holds every tunable of the server with documented defaults.
//! The binary builds it from the command line (see [`crate::cli`]).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::ClientId;

/// Default listen port when neither `--port` nor `CHAT_PORT` is given
pub const DEFAULT_PORT: u16 = 5050;

/// Default listen host
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Upper bound on one broadcast write to a single recipient
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Outbound message buffer per session
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Largest accepted `FILE|name|size` payload
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Default upload directory, relative to the working directory
pub const DEFAULT_UPLOAD_DIR: &str = "ChatUploads";

/// Longest accepted nickname, in characters
pub const MAX_NICKNAME_LEN: usize = 32;

/// Longest accepted inbound line, excluding the terminator
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Whether a sender receives its own chat lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoPolicy {
    /// Sender is excluded from its own chat broadcasts
    #[default]
    Suppress,
    /// Sender receives its own chat line like everyone else
    Echo,
}

impl EchoPolicy {
    /// The identity to exclude when broadcasting a chat line from `sender`
    pub fn exclude_for(self, sender: ClientId) -> Option<ClientId> {
        match self {
            EchoPolicy::Suppress => Some(sender),
            EchoPolicy::Echo => None,
        }
    }
}

/// Runtime configuration for the chat server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Idle timeout for client reads; `None` waits forever
    pub read_timeout: Option<Duration>,
    pub write_timeout: Duration,
    pub outbound_capacity: usize,
    pub echo: EchoPolicy,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            read_timeout: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            echo: EchoPolicy::default(),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_echo(mut self, echo: EchoPolicy) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }
}
