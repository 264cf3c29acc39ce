use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::events::{ClientCommand, Framing, LineDecoder, ServerMessage};

/// Bytes requested per read, and the largest raw-framed command
const READ_CHUNK: usize = 1024;

/// Pushes queued for a peer before it is considered stuck and dropped
pub const OUTBOUND_CAPACITY: usize = 64;

/// Time allowed to flush queued pushes (including `end`) once closing
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

pub type SessionId = u64;

/// Receiver of everything a session's receive loop produces
pub trait SessionHandler: Send + Sync + 'static {
    /// A privileged command arrived (never `Quit`, which the session handles itself)
    fn on_command(&self, session: &ClientSession, command: ClientCommand);

    /// The receive loop exited; called exactly once per session
    fn on_disconnect(&self, session: &ClientSession);
}

/// Write side queue of a session that has not been started yet
pub struct SessionOutbox {
    rx: mpsc::Receiver<Vec<u8>>,
}

/// One connected peer.
///
/// The session owns its stream through two tasks: a receive loop that parses
/// commands and a writer that drains pushed messages in order. Pushes never
/// block, so they can be issued while the server holds its state lock; a peer
/// that lets [`OUTBOUND_CAPACITY`] pushes pile up is disconnected.
pub struct ClientSession {
    id: SessionId,
    addr: SocketAddr,
    framing: Framing,
    secret: Option<String>,
    alive: AtomicBool,
    outbound: mpsc::Sender<Vec<u8>>,
    closed: watch::Sender<bool>,
}

impl ClientSession {
    pub fn new(
        id: SessionId,
        addr: SocketAddr,
        framing: Framing,
        secret: Option<String>,
    ) -> (Arc<Self>, SessionOutbox) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (closed, _) = watch::channel(false);
        let session = Arc::new(Self {
            id,
            addr,
            framing,
            secret,
            alive: AtomicBool::new(true),
            outbound: tx,
            closed,
        });
        (session, SessionOutbox { rx })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Queue a message for this peer. Dropped silently once the writer is
    /// gone; a full queue closes the session.
    pub fn send(&self, message: &ServerMessage) {
        match self.outbound.try_send(self.framing.encode(message)) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Client {} is not reading, dropping it", self.addr);
                self.close();
            }
        }
    }

    /// Server-initiated termination: tell the peer `end`, close the
    /// connection and wake the receive loop out of any pending read.
    pub fn stop(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.send(&ServerMessage::End);
        }
        self.close();
    }

    fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.closed.send_replace(true);
    }

    /// Spawn the receive loop and writer over `stream`.
    pub fn run<S>(self: &Arc<Self>, stream: S, outbox: SessionOutbox, handler: Arc<dyn SessionHandler>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        tokio::spawn(Arc::clone(self).write_loop(writer, outbox));
        tokio::spawn(Arc::clone(self).receive_loop(reader, handler));
    }

    async fn receive_loop<R>(self: Arc<Self>, mut reader: R, handler: Arc<dyn SessionHandler>)
    where
        R: AsyncRead + Unpin,
    {
        let mut closed = self.closed.subscribe();
        let mut buf = [0u8; READ_CHUNK];
        let mut decoder = LineDecoder::new();

        'read: loop {
            let is_closed = *closed.borrow_and_update();
            if is_closed || !self.is_alive() {
                break;
            }

            let n = tokio::select! {
                _ = closed.changed() => continue 'read,
                result = reader.read(&mut buf) => match result {
                    Ok(0) => break 'read,
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!("Read from {} failed: {}", self.addr, e);
                        break 'read;
                    }
                },
            };

            let frames = match self.framing {
                Framing::Newline => decoder.push(&buf[..n]),
                Framing::Raw => vec![String::from_utf8_lossy(&buf[..n]).into_owned()],
            };

            for frame in frames {
                match ClientCommand::parse(&frame, self.secret.as_deref()) {
                    Some(ClientCommand::Quit) => {
                        tracing::debug!("Client {} sent quit", self.addr);
                        self.stop();
                        break 'read;
                    }
                    Some(command) => handler.on_command(&self, command),
                    None => tracing::debug!("Ignoring input from {}: {:?}", self.addr, frame),
                }
            }
        }

        self.close();
        handler.on_disconnect(&self);
    }

    async fn write_loop<W>(self: Arc<Self>, mut writer: W, mut outbox: SessionOutbox)
    where
        W: AsyncWrite + Unpin,
    {
        let mut closed = self.closed.subscribe();

        loop {
            let is_closed = *closed.borrow_and_update();
            if is_closed {
                // Whatever is already queued (normally `end`) still goes out
                let flush = async {
                    while let Ok(bytes) = outbox.rx.try_recv() {
                        if writer.write_all(&bytes).await.is_err() {
                            break;
                        }
                    }
                };
                let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, flush).await;
                break;
            }

            tokio::select! {
                biased;
                item = outbox.rx.recv() => {
                    let Some(bytes) = item else { break };
                    let written = tokio::select! {
                        biased;
                        result = writer.write_all(&bytes) => result,
                        _ = closed.changed() => continue,
                    };
                    if let Err(e) = written {
                        tracing::debug!("Write to {} failed: {}", self.addr, e);
                        // Peer is gone; make the receive loop notice.
                        self.close();
                        break;
                    }
                }
                _ = closed.changed() => {}
            }
        }
        let _ = writer.shutdown().await;
    }
}
