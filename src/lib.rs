//! Multi-Client TCP Chat Server Library
//!
//! A line-oriented chat server built on tokio. Every client picks a
//! nickname, then each line it sends is relayed to everyone else.
//!
//! # Features
//! - Nickname handshake with duplicate rejection
//! - Broadcast of chat lines, join and leave notices
//! - `/quit` command and disconnect handling
//! - File uploads (`FILE|name|size` + raw bytes) into a directory store
//! - Bounded per-recipient writes so a slow client cannot stall others
//!
//! # Architecture
//! - `Registry` is an actor owning the connected-client list; sessions talk
//!   to it through a cloneable `RegistryHandle`
//! - Each connection runs a `handler` task plus a writer task draining its
//!   outbound `ClientSink`
//! - `Dispatcher` snapshots the registry and fans a message out without
//!   holding any lock during I/O
//!
//! # Example
//! ```ignore
//! use chat_server::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ChatServer::bind(ServerConfig::default()).await.unwrap();
//!     server.run().await;
//! }
//! ```

pub mod broadcast;
pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use broadcast::{BroadcastReport, Dispatcher};
pub use client::ClientSink;
pub use config::{EchoPolicy, ServerConfig};
pub use error::{ChatError, DeliveryError, StoreError};
pub use handler::handle_connection;
pub use message::{ClientLine, Message};
pub use registry::{Registry, RegistryEntry, RegistryHandle};
pub use server::ChatServer;
pub use store::FileStore;
pub use types::{ClientId, SessionState};
