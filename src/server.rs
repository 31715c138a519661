//! TCP listener
//!
//! Accepts connections forever and spawns one independent session task per
//! client, so a slow or stuck client never delays the next accept.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::broadcast::Dispatcher;
use crate::config::ServerConfig;
use crate::error::ChatError;
use crate::handler::{handle_connection, SessionContext};
use crate::registry::{Registry, RegistryHandle};
use crate::store::FileStore;

/// The chat server: a bound listener plus the shared session context
pub struct ChatServer {
    listener: TcpListener,
    ctx: SessionContext,
}

impl ChatServer {
    /// Bind the listener and start the client registry
    pub async fn bind(config: ServerConfig) -> Result<Self, ChatError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ChatError::Bind { addr, source })?;

        let registry = Registry::spawn();
        let ctx = SessionContext {
            dispatcher: Dispatcher::new(registry, config.write_timeout),
            store: FileStore::new(config.upload_dir.clone()),
            config: Arc::new(config),
        };

        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the client registry, for inspection
    pub fn registry(&self) -> RegistryHandle {
        self.ctx.dispatcher.registry().clone()
    }

    /// Accept connections until the process ends
    pub async fn run(self) {
        self.run_until(std::future::pending::<()>()).await;
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// Sessions already running are left alone.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let ChatServer { listener, ctx } = self;
        tokio::pin!(shutdown);

        info!("Accepting connections");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Listener shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => spawn_session(stream, peer, &ctx),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, ctx: &SessionContext) {
    debug!("New connection from {}", peer);
    let ctx = ctx.clone();

    tokio::spawn(async move {
        if let Err(e) = handle_connection(stream, ctx).await {
            if e.is_client_facing() {
                warn!("Session from {} refused: {}", peer, e);
            } else {
                debug!("Session from {} ended early: {}", peer, e);
            }
        }
    });
}
