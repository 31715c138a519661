//! Client registry actor
//!
//! The single source of truth for who is connected. The registry task owns
//! every entry and processes commands one at a time, so registrations and
//! deregistrations never interleave and a snapshot always reflects a single
//! instant. Other tasks only talk to it through [`RegistryHandle`].

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::client::ClientSink;
use crate::error::ChatError;
use crate::types::ClientId;

/// Channel buffer size for registry commands
const COMMAND_BUFFER_SIZE: usize = 256;

/// One active client, as seen by broadcasters
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub id: ClientId,
    pub nickname: String,
    pub sink: ClientSink,
}

/// Commands sent from handles to the registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    /// Add an active client
    Register {
        entry: RegistryEntry,
        reply: oneshot::Sender<Result<(), ChatError>>,
    },
    /// Remove a client; replies with its nickname if it was present
    Deregister {
        client_id: ClientId,
        reply: oneshot::Sender<Option<String>>,
    },
    /// Copy all entries in registration order
    Snapshot {
        reply: oneshot::Sender<Vec<RegistryEntry>>,
    },
}

/// The registry actor
///
/// Entries are kept in a `Vec` so iteration order is registration order.
pub struct Registry {
    entries: Vec<RegistryEntry>,
    receiver: mpsc::Receiver<RegistryCommand>,
}

impl Registry {
    /// Start the registry actor on the current runtime and return its handle
    pub fn spawn() -> RegistryHandle {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let registry = Registry {
            entries: Vec::new(),
            receiver,
        };
        tokio::spawn(registry.run());
        RegistryHandle { sender }
    }

    /// Run the registry event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    async fn run(mut self) {
        debug!("Client registry started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        debug!("Client registry shutting down");
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register { entry, reply } => {
                let _ = reply.send(self.handle_register(entry));
            }
            RegistryCommand::Deregister { client_id, reply } => {
                let _ = reply.send(self.handle_deregister(client_id));
            }
            RegistryCommand::Snapshot { reply } => {
                let _ = reply.send(self.entries.clone());
            }
        }
    }

    fn handle_register(&mut self, entry: RegistryEntry) -> Result<(), ChatError> {
        if self.entries.iter().any(|e| e.nickname == entry.nickname) {
            return Err(ChatError::NicknameTaken(entry.nickname));
        }

        info!("Client {} registered as '{}'", entry.id, entry.nickname);
        self.entries.push(entry);
        debug!("Total clients: {}", self.entries.len());
        Ok(())
    }

    fn handle_deregister(&mut self, client_id: ClientId) -> Option<String> {
        let index = self.entries.iter().position(|e| e.id == client_id)?;
        let entry = self.entries.remove(index);

        info!("Client {} ('{}') deregistered", client_id, entry.nickname);
        debug!("Total clients: {}", self.entries.len());
        Some(entry.nickname)
    }
}

/// Cloneable handle to the registry actor
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Register `nickname` for `client_id`
    ///
    /// Fails with [`ChatError::NicknameTaken`] if an active client already
    /// holds the exact same nickname (case-sensitive).
    pub async fn register(
        &self,
        client_id: ClientId,
        nickname: String,
        sink: ClientSink,
    ) -> Result<(), ChatError> {
        let entry = RegistryEntry {
            id: client_id,
            nickname,
            sink,
        };
        self.request(|reply| RegistryCommand::Register { entry, reply })
            .await?
    }

    /// Remove `client_id`; a no-op returning `None` if it is absent
    pub async fn deregister(&self, client_id: ClientId) -> Result<Option<String>, ChatError> {
        self.request(|reply| RegistryCommand::Deregister { client_id, reply })
            .await
    }

    /// Point-in-time copy of all active clients, in registration order
    pub async fn snapshot(&self) -> Result<Vec<RegistryEntry>, ChatError> {
        self.request(|reply| RegistryCommand::Snapshot { reply })
            .await
    }

    /// Number of active clients
    pub async fn len(&self) -> Result<usize, ChatError> {
        Ok(self.snapshot().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, ChatError> {
        Ok(self.len().await? == 0)
    }

    /// Nicknames of all active clients, in registration order
    pub async fn nicknames(&self) -> Result<Vec<String>, ChatError> {
        Ok(self
            .snapshot()
            .await?
            .into_iter()
            .map(|e| e.nickname)
            .collect())
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, ChatError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(make(reply))
            .await
            .map_err(|_| ChatError::RegistryClosed)?;
        response.await.map_err(|_| ChatError::RegistryClosed)
    }
}
