use coop_timer_broadcaster::{
    BroadcasterConfig, BroadcasterError, Framing, TimerBroadcaster, TimerStatus,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_test::{assert_err, assert_ok};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    /// Next pushed line, or `None` once the server closed the connection
    async fn next_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(READ_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a message")
            .unwrap();
        if n == 0 {
            None
        } else {
            Some(line.trim_end().to_string())
        }
    }

    async fn expect_silence(&mut self) {
        let mut line = String::new();
        let result =
            tokio::time::timeout(Duration::from_millis(200), self.reader.read_line(&mut line)).await;
        assert!(result.is_err(), "unexpected message: {:?}", line);
    }

    async fn send(&mut self, command: &str) {
        self.writer.write_all(command.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }
}

fn config(secret: Option<&str>) -> BroadcasterConfig {
    BroadcasterConfig {
        address: "127.0.0.1".to_string(),
        port: 0,
        secret: secret.map(str::to_string),
        framing: Framing::Newline,
    }
}

async fn started(secret: Option<&str>) -> (TimerBroadcaster, SocketAddr) {
    let broadcaster = TimerBroadcaster::new(config(secret));
    let addr = assert_ok!(broadcaster.start().await);
    (broadcaster, addr)
}

async fn wait_for_sessions(broadcaster: &TimerBroadcaster, expected: usize) {
    for _ in 0..200 {
        if broadcaster.session_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} sessions, have {}",
        expected,
        broadcaster.session_count()
    );
}

fn elapsed_of(line: &str, status: &str) -> f64 {
    let seconds = line
        .strip_prefix(status)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or_else(|| panic!("expected {} status, got {:?}", status, line));
    seconds.parse().unwrap()
}

#[tokio::test]
async fn test_broadcaster_lifecycle() {
    let (broadcaster, addr) = started(None).await;
    assert!(broadcaster.is_running());
    assert_eq!(broadcaster.local_addr(), Some(addr));

    // Second start is a no-op
    assert_eq!(assert_ok!(broadcaster.start().await), addr);

    broadcaster.kill().await;
    assert!(!broadcaster.is_running());

    let restart = broadcaster.start().await;
    assert!(matches!(restart, Err(BroadcasterError::Terminated)));
}

#[tokio::test]
async fn test_bind_error_when_port_in_use() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let broadcaster = TimerBroadcaster::new(BroadcasterConfig {
        port,
        ..config(None)
    });
    let err = assert_err!(broadcaster.start().await);
    assert!(matches!(err, BroadcasterError::Bind { .. }));
    assert!(!broadcaster.is_running());
}

#[tokio::test]
async fn test_new_client_is_synced_immediately() {
    let (broadcaster, addr) = started(None).await;

    let mut first = TestClient::connect(addr).await;
    assert_eq!(first.next_line().await.as_deref(), Some("stop"));

    broadcaster.start_timer();
    assert!(elapsed_of(&first.next_line().await.unwrap(), "running") >= 0.0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut late = TestClient::connect(addr).await;
    let seconds = elapsed_of(&late.next_line().await.unwrap(), "running");
    assert!(seconds >= 0.05, "late joiner saw {}", seconds);

    broadcaster.kill().await;
}

#[tokio::test]
async fn test_broadcast_to_multiple_clients() {
    let (broadcaster, addr) = started(None).await;

    let mut client1 = TestClient::connect(addr).await;
    let mut client2 = TestClient::connect(addr).await;
    assert_eq!(client1.next_line().await.as_deref(), Some("stop"));
    assert_eq!(client2.next_line().await.as_deref(), Some("stop"));
    assert_eq!(broadcaster.session_count(), 2);

    broadcaster.start_timer();
    broadcaster.pause_timer();

    for client in [&mut client1, &mut client2] {
        elapsed_of(&client.next_line().await.unwrap(), "running");
        elapsed_of(&client.next_line().await.unwrap(), "paused");
    }

    broadcaster.kill().await;
}

#[tokio::test]
async fn test_every_transition_broadcasts_once() {
    let (broadcaster, addr) = started(None).await;
    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.next_line().await.as_deref(), Some("stop"));

    // No-op transitions still resync clients
    broadcaster.pause_timer();
    broadcaster.reset_timer();
    broadcaster.start_timer();
    broadcaster.start_timer();

    assert_eq!(client.next_line().await.as_deref(), Some("stop"));
    assert_eq!(client.next_line().await.as_deref(), Some("stop"));
    let first = elapsed_of(&client.next_line().await.unwrap(), "running");
    let second = elapsed_of(&client.next_line().await.unwrap(), "running");
    assert!(second >= first);
    client.expect_silence().await;

    broadcaster.kill().await;
}

#[tokio::test]
async fn test_quit_drops_only_that_client() {
    let (broadcaster, addr) = started(None).await;

    let mut leaving = TestClient::connect(addr).await;
    let mut staying = TestClient::connect(addr).await;
    leaving.next_line().await;
    staying.next_line().await;

    leaving.send("quit").await;
    assert_eq!(leaving.next_line().await.as_deref(), Some("end"));
    assert_eq!(leaving.next_line().await, None);
    wait_for_sessions(&broadcaster, 1).await;

    broadcaster.start_timer();
    elapsed_of(&staying.next_line().await.unwrap(), "running");

    broadcaster.kill().await;
}

#[tokio::test]
async fn test_unprefixed_pause_ignored_without_secret() {
    let (broadcaster, addr) = started(None).await;
    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.next_line().await.as_deref(), Some("stop"));

    client.send("pause").await;
    client.send("reset").await;
    client.expect_silence().await;
    assert_eq!(broadcaster.status(), TimerStatus::Stopped);

    broadcaster.kill().await;
}

#[tokio::test]
async fn test_secret_commands_control_timer() {
    let (broadcaster, addr) = started(Some("hunter2")).await;
    let mut controller = TestClient::connect(addr).await;
    let mut watcher = TestClient::connect(addr).await;
    controller.next_line().await;
    watcher.next_line().await;

    controller.send("pause").await;
    controller.send("hunter2pause").await;
    elapsed_of(&watcher.next_line().await.unwrap(), "running");
    assert_eq!(broadcaster.status(), TimerStatus::Running);

    controller.send("hunter2pause").await;
    elapsed_of(&watcher.next_line().await.unwrap(), "paused");

    controller.send("hunter2reset").await;
    assert_eq!(watcher.next_line().await.as_deref(), Some("stop"));
    assert_eq!(broadcaster.status(), TimerStatus::Stopped);

    broadcaster.kill().await;
}

#[tokio::test]
async fn test_kill_ends_every_session() {
    let (broadcaster, addr) = started(None).await;
    let mut client1 = TestClient::connect(addr).await;
    let mut client2 = TestClient::connect(addr).await;
    client1.next_line().await;
    client2.next_line().await;

    broadcaster.kill().await;

    for client in [&mut client1, &mut client2] {
        assert_eq!(client.next_line().await.as_deref(), Some("end"));
        assert_eq!(client.next_line().await, None);
    }
    assert_eq!(broadcaster.session_count(), 0);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_kill_racing_start_never_leaves_server_running() {
    for _ in 0..50 {
        let broadcaster = TimerBroadcaster::new(config(None));

        let starter = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move { broadcaster.start().await })
        };
        let killer = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move { broadcaster.kill().await })
        };

        let started = starter.await.unwrap();
        killer.await.unwrap();

        assert!(!broadcaster.is_running());
        if let Ok(addr) = started {
            assert!(TcpStream::connect(addr).await.is_err());
        }
    }
}

#[tokio::test]
async fn test_concurrent_disconnects_during_broadcasts() {
    let (broadcaster, addr) = started(None).await;

    let ticker = {
        let broadcaster = broadcaster.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                broadcaster.toggle_pause();
                tokio::task::yield_now().await;
            }
        })
    };

    let mut clients = Vec::new();
    for _ in 0..16 {
        clients.push(tokio::spawn(async move {
            let mut client = TestClient::connect(addr).await;
            client.next_line().await;
            drop(client);
        }));
    }
    for client in clients {
        client.await.unwrap();
    }
    ticker.await.unwrap();

    wait_for_sessions(&broadcaster, 0).await;
    broadcaster.kill().await;
}

#[tokio::test]
async fn test_raw_framing_pushes_unterminated_messages() {
    let broadcaster = TimerBroadcaster::new(BroadcasterConfig {
        framing: Framing::Raw,
        ..config(None)
    });
    let addr = assert_ok!(broadcaster.start().await);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 64];
    let n = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"stop");

    stream.write_all(b"quit").await.unwrap();
    let n = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"end");

    broadcaster.kill().await;
}
