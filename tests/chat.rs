use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chat_server::{ChatServer, EchoPolicy, FileStore, RegistryHandle, ServerConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use uuid::Uuid;

const READ_TIMEOUT: Duration = Duration::from_secs(3);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    upload_dir: PathBuf,
}

fn test_config() -> ServerConfig {
    let upload_dir = std::env::temp_dir().join(format!("chat-e2e-{}", Uuid::new_v4()));
    ServerConfig::default()
        .with_port(0)
        .with_upload_dir(upload_dir)
}

async fn start_server(echo: EchoPolicy, max_upload_bytes: usize) -> TestServer {
    start_server_with(
        test_config()
            .with_echo(echo)
            .with_max_upload_bytes(max_upload_bytes),
    )
    .await
}

async fn start_server_with(config: ServerConfig) -> TestServer {
    let upload_dir = config.upload_dir.clone();
    let server = ChatServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    tokio::spawn(server.run());

    TestServer {
        addr,
        registry,
        upload_dir,
    }
}

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut client = Self {
            lines: BufReader::new(reader).lines(),
            writer,
        };
        assert_eq!(client.recv().await, "NICK");
        client
    }

    /// Connect and complete the handshake, consuming the welcome and own join notice
    async fn join(addr: SocketAddr, nickname: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(nickname).await;
        assert_eq!(client.recv().await, "* connected to chat server");
        assert_eq!(client.recv().await, format!("* {nickname} has joined"));
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> String {
        timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap()
            .expect("connection closed while waiting for a line")
    }

    async fn expect_closed(&mut self) {
        let next = timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for close");
        match next {
            Ok(None) | Err(_) => {}
            Ok(Some(line)) => panic!("expected close, got {line:?}"),
        }
    }

    async fn expect_silence(&mut self) {
        if let Ok(line) = timeout(QUIET_PERIOD, self.lines.next_line()).await {
            panic!("expected no traffic, got {line:?}");
        }
    }
}

async fn wait_for_nicknames(registry: &RegistryHandle, expected: &[&str]) {
    let poll = async {
        loop {
            if registry.nicknames().await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    timeout(READ_TIMEOUT, poll)
        .await
        .expect("registry never reached the expected state");
}

#[tokio::test]
async fn test_three_clients_chat_and_one_leaves() {
    let server = start_server(EchoPolicy::Suppress, 1024).await;

    let mut alice = TestClient::join(server.addr, "alice").await;
    let mut bob = TestClient::join(server.addr, "bob").await;
    assert_eq!(alice.recv().await, "* bob has joined");
    let mut carol = TestClient::join(server.addr, "carol").await;
    assert_eq!(alice.recv().await, "* carol has joined");
    assert_eq!(bob.recv().await, "* carol has joined");

    alice.send("hi").await;
    assert_eq!(bob.recv().await, "alice: hi");
    assert_eq!(carol.recv().await, "alice: hi");

    bob.send("/quit").await;
    bob.expect_closed().await;

    // No self-echo: alice's next line is the departure notice
    assert_eq!(alice.recv().await, "* bob has left");
    assert_eq!(carol.recv().await, "* bob has left");
    alice.expect_silence().await;
    carol.expect_silence().await;

    assert_eq!(
        server.registry.nicknames().await.unwrap(),
        vec!["alice", "carol"]
    );
}

#[tokio::test]
async fn test_abrupt_disconnect_is_announced() {
    let server = start_server(EchoPolicy::Suppress, 1024).await;

    let mut alice = TestClient::join(server.addr, "alice").await;
    let bob = TestClient::join(server.addr, "bob").await;
    assert_eq!(alice.recv().await, "* bob has joined");

    drop(bob);

    assert_eq!(alice.recv().await, "* bob has left");
    wait_for_nicknames(&server.registry, &["alice"]).await;
}

#[tokio::test]
async fn test_duplicate_nickname_is_rejected_until_released() {
    let server = start_server(EchoPolicy::Suppress, 1024).await;

    let mut first = TestClient::join(server.addr, "alice").await;

    let mut second = TestClient::connect(server.addr).await;
    second.send("alice").await;
    assert_eq!(second.recv().await, "* nickname 'alice' is already taken");
    second.expect_closed().await;
    assert_eq!(server.registry.len().await.unwrap(), 1);
    first.expect_silence().await;

    first.send("/quit").await;
    first.expect_closed().await;
    wait_for_nicknames(&server.registry, &[]).await;

    let _again = TestClient::join(server.addr, "alice").await;
    assert_eq!(server.registry.nicknames().await.unwrap(), vec!["alice"]);
}

#[tokio::test]
async fn test_empty_nickname_is_rejected() {
    let server = start_server(EchoPolicy::Suppress, 1024).await;

    let mut client = TestClient::connect(server.addr).await;
    client.send("   ").await;
    assert_eq!(
        client.recv().await,
        "* invalid nickname: nickname cannot be empty"
    );
    client.expect_closed().await;
    assert!(server.registry.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_echo_policy_delivers_to_sender() {
    let server = start_server(EchoPolicy::Echo, 1024).await;

    let mut alice = TestClient::join(server.addr, "alice").await;
    let mut bob = TestClient::join(server.addr, "bob").await;
    assert_eq!(alice.recv().await, "* bob has joined");

    alice.send("hello").await;
    assert_eq!(alice.recv().await, "alice: hello");
    assert_eq!(bob.recv().await, "alice: hello");
    alice.expect_silence().await;
    bob.expect_silence().await;
}

#[tokio::test]
async fn test_stalled_handshake_does_not_block_others() {
    let server = start_server(EchoPolicy::Suppress, 1024).await;

    // Never answers the prompt
    let _lurker = TestClient::connect(server.addr).await;

    let mut alice = TestClient::join(server.addr, "alice").await;
    let mut bob = TestClient::join(server.addr, "bob").await;
    assert_eq!(alice.recv().await, "* bob has joined");

    bob.send("still works").await;
    assert_eq!(alice.recv().await, "bob: still works");
    assert_eq!(server.registry.len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_upload_is_stored_and_announced() {
    let server = start_server(EchoPolicy::Suppress, 1024).await;

    let mut alice = TestClient::join(server.addr, "alice").await;
    let mut bob = TestClient::join(server.addr, "bob").await;
    assert_eq!(alice.recv().await, "* bob has joined");

    alice.send_raw(b"FILE|notes.txt|5\nhello").await;
    assert_eq!(
        alice.recv().await,
        "* alice uploaded file: notes.txt (5 bytes)"
    );
    assert_eq!(bob.recv().await, "* alice uploaded file: notes.txt (5 bytes)");

    let store = FileStore::new(&server.upload_dir);
    assert_eq!(store.retrieve("notes.txt").await.unwrap(), b"hello");
    assert_eq!(store.list().await.unwrap(), vec!["notes.txt"]);

    // Chat continues normally after the payload
    alice.send("done").await;
    assert_eq!(bob.recv().await, "alice: done");

    tokio::fs::remove_dir_all(&server.upload_dir).await.unwrap();
}

#[tokio::test]
async fn test_oversize_upload_is_skipped() {
    let server = start_server(EchoPolicy::Suppress, 4).await;

    let mut alice = TestClient::join(server.addr, "alice").await;
    let mut bob = TestClient::join(server.addr, "bob").await;
    assert_eq!(alice.recv().await, "* bob has joined");

    alice.send_raw(b"FILE|big.bin|5\n12345").await;
    assert_eq!(
        alice.recv().await,
        "* invalid upload: file larger than 4 bytes"
    );

    alice.send("after").await;
    assert_eq!(bob.recv().await, "alice: after");
    assert!(FileStore::new(&server.upload_dir)
        .list()
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unresponsive_reader_is_disconnected() {
    let config = test_config()
        .with_outbound_capacity(1)
        .with_write_timeout(Duration::from_millis(50));
    let server = start_server_with(config).await;

    let mut alice = TestClient::join(server.addr, "alice").await;
    // Bob joins, then never reads again
    let _bob = TestClient::join(server.addr, "bob").await;
    assert_eq!(alice.recv().await, "* bob has joined");

    // Flood until bob's socket buffers and outbound channel are full
    let line = "x".repeat(16 * 1024);
    let flood = async {
        loop {
            alice.send(&line).await;
            if server.registry.nicknames().await.unwrap() == ["alice"] {
                return;
            }
        }
    };
    timeout(Duration::from_secs(20), flood)
        .await
        .expect("bob was never disconnected");

    assert_eq!(alice.recv().await, "* bob has left");
    assert_eq!(server.registry.nicknames().await.unwrap(), vec!["alice"]);
}
