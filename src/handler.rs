//! Per-connection session handler
//!
//! Drives one client through `Connecting → Active → Disconnecting → Closed`:
//! nickname handshake, registration, the read loop, and teardown. Outbound
//! traffic goes through a writer task draining the client's [`ClientSink`],
//! so broadcasts from other sessions never touch this socket directly.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::Dispatcher;
use crate::client::ClientSink;
use crate::config::{ServerConfig, MAX_NICKNAME_LEN};
use crate::connection::{Connection, LineReader, LineWriter};
use crate::error::ChatError;
use crate::message::{ClientLine, Message, NICK_PROMPT};
use crate::store::FileStore;
use crate::types::{ClientId, SessionState};

/// Shared collaborators handed to every session
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub dispatcher: Dispatcher,
    pub store: FileStore,
    pub config: Arc<ServerConfig>,
}

/// Why an active session ended
#[derive(Debug)]
enum DisconnectReason {
    Quit,
    EndOfStream,
    ConnectionLost(ChatError),
    SinkLost,
}

/// Session state holder; enforces forward-only transitions
struct Session {
    id: ClientId,
    state: SessionState,
}

impl Session {
    fn new(id: ClientId) -> Self {
        Self {
            id,
            state: SessionState::Connecting,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {} -> {}",
            self.state,
            next
        );
        debug!("Client {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }
}

/// Handle a new TCP connection
///
/// Returns an error only for handshake failures; once the client is
/// active, every exit path deregisters it and closes the socket.
pub async fn handle_connection(stream: TcpStream, ctx: SessionContext) -> Result<(), ChatError> {
    let conn = Connection::new(stream, ctx.config.read_timeout);
    let peer = conn.peer();
    let (mut reader, mut writer) = conn.split();
    let mut session = Session::new(ClientId::new());

    debug!("Client {} connecting from {:?}", session.id, peer);

    // Connecting: nickname handshake
    let nickname = match handshake(&mut reader, &mut writer).await {
        Ok(Some(nickname)) => nickname,
        Ok(None) => {
            debug!("Client {} closed before sending a nickname", session.id);
            session.transition(SessionState::Disconnecting);
            session.transition(SessionState::Closed);
            return Ok(());
        }
        Err(e) => {
            reject(&mut writer, &e).await;
            session.transition(SessionState::Disconnecting);
            session.transition(SessionState::Closed);
            return Err(e);
        }
    };

    let (sink, outbound) = ClientSink::channel(ctx.config.outbound_capacity);
    let registry = ctx.dispatcher.registry();
    if let Err(e) = registry
        .register(session.id, nickname.clone(), sink.clone())
        .await
    {
        warn!("Client {} rejected: {}", session.id, e);
        reject(&mut writer, &e).await;
        session.transition(SessionState::Disconnecting);
        session.transition(SessionState::Closed);
        return Err(e);
    }

    // Active
    session.transition(SessionState::Active);
    info!("Client {} joined as '{}' from {:?}", session.id, nickname, peer);

    let welcome = writer
        .write_line(&Message::notice("connected to chat server").to_string())
        .await;
    let write_task = tokio::spawn(write_loop(session.id, writer, outbound, sink.clone()));

    let (reason, announced) = match welcome {
        Ok(()) => {
            announce(&ctx, &Message::joined(&nickname), None).await;
            let reason = read_loop(&ctx, session.id, &nickname, &mut reader, &sink).await;
            (reason, true)
        }
        Err(e) => (DisconnectReason::ConnectionLost(e), false),
    };

    // Disconnecting
    session.transition(SessionState::Disconnecting);
    teardown(&ctx, &session, &nickname, peer, reason, announced, write_task).await;
    drop(reader);
    session.transition(SessionState::Closed);

    Ok(())
}

/// Prompt for a nickname and validate it
///
/// `Ok(None)` means the client hung up before answering.
async fn handshake(
    reader: &mut LineReader<OwnedReadHalf>,
    writer: &mut LineWriter<OwnedWriteHalf>,
) -> Result<Option<String>, ChatError> {
    writer.write_line(NICK_PROMPT).await?;
    match reader.read_line().await? {
        Some(line) => validate_nickname(&line).map(Some),
        None => Ok(None),
    }
}

/// Trim and check a proposed nickname
pub fn validate_nickname(raw: &str) -> Result<String, ChatError> {
    let nickname = raw.trim();
    if nickname.is_empty() {
        return Err(ChatError::InvalidNickname("nickname cannot be empty".into()));
    }
    if nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(ChatError::InvalidNickname(format!(
            "nickname longer than {MAX_NICKNAME_LEN} characters"
        )));
    }
    if nickname.chars().any(char::is_control) {
        return Err(ChatError::InvalidNickname(
            "nickname contains control characters".into(),
        ));
    }
    Ok(nickname.to_string())
}

/// Report a handshake failure to the client, then close the write side
async fn reject(writer: &mut LineWriter<OwnedWriteHalf>, err: &ChatError) {
    if err.is_client_facing() {
        let _ = writer.write_line(&Message::from(err).to_string()).await;
    }
    writer.shutdown().await;
}

/// Drain the outbound channel into the socket
///
/// A failed socket write marks the sink lost so the read loop ends too.
async fn write_loop(
    client_id: ClientId,
    mut writer: LineWriter<OwnedWriteHalf>,
    mut outbound: mpsc::Receiver<Message>,
    sink: ClientSink,
) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = writer.write_line(&msg.to_string()).await {
            debug!("Write failed for {}: {}", client_id, e);
            sink.mark_lost();
            break;
        }
    }
    debug!("Write task ended for {}", client_id);
}

/// Active state: relay lines until quit, EOF, or a lost connection
async fn read_loop(
    ctx: &SessionContext,
    client_id: ClientId,
    nickname: &str,
    reader: &mut LineReader<OwnedReadHalf>,
    sink: &ClientSink,
) -> DisconnectReason {
    loop {
        let line = tokio::select! {
            line = reader.read_line() => line,
            _ = sink.lost() => return DisconnectReason::SinkLost,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => return DisconnectReason::EndOfStream,
            Err(e) => return DisconnectReason::ConnectionLost(e),
        };

        let parsed = match ClientLine::parse(&line) {
            Ok(parsed) => parsed,
            Err(e) => {
                notify_self(ctx, sink, &e).await;
                continue;
            }
        };

        match parsed {
            ClientLine::Empty => {}
            ClientLine::Quit => return DisconnectReason::Quit,
            ClientLine::Chat(text) => {
                let exclude = ctx.config.echo.exclude_for(client_id);
                announce(ctx, &Message::chat(nickname, text), exclude).await;
            }
            ClientLine::Upload { file_name, size } => {
                if let Err(e) = receive_upload(ctx, nickname, reader, &file_name, size).await {
                    if !e.is_client_facing() {
                        return DisconnectReason::ConnectionLost(e);
                    }
                    warn!("Upload from {} rejected: {}", client_id, e);
                    notify_self(ctx, sink, &e).await;
                }
            }
        }
    }
}

/// Read an upload payload, store it, and announce it to everyone
async fn receive_upload(
    ctx: &SessionContext,
    nickname: &str,
    reader: &mut LineReader<OwnedReadHalf>,
    file_name: &str,
    size: usize,
) -> Result<(), ChatError> {
    if size > ctx.config.max_upload_bytes {
        reader.skip_bytes(size).await?;
        return Err(ChatError::InvalidUpload(format!(
            "file larger than {} bytes",
            ctx.config.max_upload_bytes
        )));
    }

    let payload = reader.read_exact_bytes(size).await?;
    let stored_as = ctx.store.store(file_name, &payload).await?;
    info!("'{}' uploaded {} ({} bytes)", nickname, stored_as, size);
    announce(ctx, &Message::uploaded(nickname, &stored_as, size), None).await;
    Ok(())
}

/// Send a protocol error notice to this client only
async fn notify_self(ctx: &SessionContext, sink: &ClientSink, err: &ChatError) {
    if let Err(e) = sink
        .deliver(Message::from(err), ctx.config.write_timeout)
        .await
    {
        debug!("Could not report error to client: {}", e);
    }
}

/// Broadcast, logging (never propagating) a stopped registry
async fn announce(ctx: &SessionContext, message: &Message, exclude: Option<ClientId>) {
    if let Err(e) = ctx.dispatcher.broadcast(message, exclude).await {
        warn!("Broadcast failed: {}", e);
    }
}

/// Disconnecting state: deregister, tell the others, release the socket
async fn teardown(
    ctx: &SessionContext,
    session: &Session,
    nickname: &str,
    peer: Option<SocketAddr>,
    reason: DisconnectReason,
    announced: bool,
    write_task: JoinHandle<()>,
) {
    match &reason {
        DisconnectReason::ConnectionLost(e) => {
            info!("Client {} ('{}') lost: {}", session.id, nickname, e)
        }
        other => info!(
            "Client {} ('{}') disconnected from {:?}: {:?}",
            session.id, nickname, peer, other
        ),
    }

    match ctx.dispatcher.registry().deregister(session.id).await {
        Ok(removed) => {
            if let Some(notice) = leave_notice(announced, removed.as_deref()) {
                announce(ctx, &notice, Some(session.id)).await;
            }
        }
        Err(e) => warn!("Failed to deregister {}: {}", session.id, e),
    }

    // The leaving client sees nothing further; dropping the writer closes the socket.
    write_task.abort();
    let _ = write_task.await;
}

/// Departure notice for a deregistered client
///
/// Only clients whose join was announced get a leave notice.
fn leave_notice(announced: bool, removed: Option<&str>) -> Option<Message> {
    match removed {
        Some(nickname) if announced => Some(Message::left(nickname)),
        _ => None,
    }
}
