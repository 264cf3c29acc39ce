use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::client::{ClientSession, SessionHandler, SessionId};
use crate::error::{BroadcasterError, Result};
use crate::events::{ClientCommand, Framing, ServerMessage};
use crate::timer::{TimerState, TimerStatus};

/// Pending connection queue length for the listening socket
const LISTEN_BACKLOG: u32 = 50;

/// Pause after an unexpected accept error before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 25564;

/// Listener settings for [`TimerBroadcaster`]
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    pub address: String,
    pub port: u16,
    /// Shared secret prefix for privileged commands; `None` disables them
    pub secret: Option<String>,
    pub framing: Framing,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            secret: None,
            framing: Framing::default(),
        }
    }
}

/// A timer transition that can be bound to an external trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerAction {
    Start,
    Pause,
    Reset,
    Toggle,
}

/// Timer fields and the session registry, guarded together
struct Shared {
    timer: TimerState,
    sessions: HashMap<SessionId, Arc<ClientSession>>,
}

struct Inner {
    config: BroadcasterConfig,
    shared: Mutex<Shared>,
    next_session_id: AtomicU64,
    running: AtomicBool,
    killed: AtomicBool,
    shutdown: Notify,
    local_addr: OnceLock<SocketAddr>,
    accept_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Shared stopwatch served to any number of TCP clients.
///
/// Every transition broadcasts the resulting status to all registered
/// sessions while still holding the state lock, so all sessions see
/// transitions in the order they were applied. Cloning is cheap and yields a
/// handle to the same server.
#[derive(Clone)]
pub struct TimerBroadcaster {
    inner: Arc<Inner>,
}

impl TimerBroadcaster {
    pub fn new(config: BroadcasterConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                shared: Mutex::new(Shared {
                    timer: TimerState::new(Instant::now()),
                    sessions: HashMap::new(),
                }),
                next_session_id: AtomicU64::new(1),
                running: AtomicBool::new(false),
                killed: AtomicBool::new(false),
                shutdown: Notify::new(),
                local_addr: OnceLock::new(),
                accept_task: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// Calling this on a server that is already running returns the existing
    /// address without rebinding.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut accept_task = self.inner.accept_task.lock().await;
        if self.inner.killed.load(Ordering::SeqCst) {
            return Err(BroadcasterError::Terminated);
        }
        if let (Some(_), Some(addr)) = (accept_task.as_ref(), self.inner.local_addr.get()) {
            return Ok(*addr);
        }

        let config = &self.inner.config;
        let display_addr = format!("{}:{}", config.address, config.port);
        let listener = bind(&config.address, config.port)
            .await
            .map_err(|source| BroadcasterError::Bind {
                addr: display_addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| BroadcasterError::Bind {
                addr: display_addr,
                source,
            })?;
        self.inner.running.store(true, Ordering::SeqCst);
        // kill() flags `killed` before clearing `running`, so checking after
        // the store cannot leave a killed server reporting itself running.
        if self.inner.killed.load(Ordering::SeqCst) {
            self.inner.running.store(false, Ordering::SeqCst);
            return Err(BroadcasterError::Terminated);
        }
        let _ = self.inner.local_addr.set(local_addr);

        tracing::info!("Timer broadcaster listening on {}", local_addr);

        *accept_task = Some(tokio::spawn(accept_loop(Arc::clone(&self.inner), listener)));

        Ok(local_addr)
    }

    /// Stop accepting, end every session, then close the listener.
    /// The server cannot be started again afterwards.
    pub async fn kill(&self) {
        if self.inner.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.shutdown.notify_one();

        let sessions: Vec<Arc<ClientSession>> = {
            let mut shared = self.inner.lock_shared();
            shared.sessions.drain().map(|(_, session)| session).collect()
        };
        for session in sessions {
            session.stop();
            tracing::info!("Client '{}' disconnected.", session.addr());
        }

        let task = self.inner.accept_task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }

        tracing::info!("Timer broadcaster stopped");
    }

    pub fn start_timer(&self) {
        self.inner.transition("start", |timer, now| timer.start(now));
    }

    pub fn pause_timer(&self) {
        self.inner.transition("pause", |timer, now| timer.pause(now));
    }

    pub fn reset_timer(&self) {
        self.inner.transition("reset", |timer, _| timer.reset());
    }

    pub fn toggle_pause(&self) {
        self.inner.transition("toggle", |timer, now| timer.toggle_pause(now));
    }

    /// Administrative override of the elapsed time; status is unchanged.
    pub fn set_time(&self, elapsed: Duration) {
        self.inner.transition("set", |timer, now| {
            timer.set_elapsed(elapsed, now);
            true
        });
    }

    pub fn apply(&self, action: TimerAction) {
        match action {
            TimerAction::Start => self.start_timer(),
            TimerAction::Pause => self.pause_timer(),
            TimerAction::Reset => self.reset_timer(),
            TimerAction::Toggle => self.toggle_pause(),
        }
    }

    /// Push the current status to every session
    pub fn broadcast_status(&self) {
        let shared = self.inner.lock_shared();
        let message = shared.timer.message(Instant::now());
        for session in shared.sessions.values() {
            session.send(&message);
        }
    }

    /// Push the current status to one session; `false` if it is not registered
    pub fn update_session(&self, id: SessionId) -> bool {
        let shared = self.inner.lock_shared();
        match shared.sessions.get(&id) {
            Some(session) => {
                session.send(&shared.timer.message(Instant::now()));
                true
            }
            None => false,
        }
    }

    /// Deregister a session; `false` if it was already gone
    pub fn remove_session(&self, id: SessionId) -> bool {
        self.inner.remove_session(id)
    }

    pub fn status(&self) -> TimerStatus {
        self.inner.lock_shared().timer.status()
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.lock_shared().timer.elapsed(Instant::now())
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock_shared().sessions.len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr.get().copied()
    }
}

impl Inner {
    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    /// Apply one transition and broadcast the result inside the same critical section
    fn transition(&self, name: &str, op: impl FnOnce(&mut TimerState, Instant) -> bool) {
        let mut shared = self.lock_shared();
        let now = Instant::now();
        let changed = op(&mut shared.timer, now);
        let message = shared.timer.message(now);

        tracing::debug!(
            "Timer {} ({}) -> {} to {} client(s)",
            name,
            if changed { "applied" } else { "no-op" },
            message,
            shared.sessions.len()
        );

        for session in shared.sessions.values() {
            session.send(&message);
        }
    }

    fn remove_session(&self, id: SessionId) -> bool {
        let removed = self.lock_shared().sessions.remove(&id);
        match removed {
            Some(session) => {
                tracing::info!("Client '{}' disconnected.", session.addr());
                true
            }
            None => false,
        }
    }

    /// Register a freshly accepted connection and sync it to the current state
    fn admit(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let _ = stream.set_nodelay(true);

        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let (session, outbox) =
            ClientSession::new(id, addr, self.config.framing, self.config.secret.clone());

        {
            let mut shared = self.lock_shared();
            // Checked under the lock so kill() cannot miss a late registration
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            session.send(&shared.timer.message(Instant::now()));
            shared.sessions.insert(id, Arc::clone(&session));
            tracing::info!(
                "Client '{}' connected. Total clients: {}",
                addr,
                shared.sessions.len()
            );
        }

        let handler: Arc<dyn SessionHandler> = Arc::clone(self) as Arc<dyn SessionHandler>;
        session.run(stream, outbox, handler);
    }
}

impl SessionHandler for Inner {
    fn on_command(&self, session: &ClientSession, command: ClientCommand) {
        tracing::info!("Client '{}' sent {:?}", session.addr(), command);
        match command {
            ClientCommand::TogglePause => {
                self.transition("toggle", |timer, now| timer.toggle_pause(now))
            }
            ClientCommand::Reset => self.transition("reset", |timer, _| timer.reset()),
            ClientCommand::Quit => {}
        }
    }

    fn on_disconnect(&self, session: &ClientSession) {
        self.remove_session(session.id());
    }
}

async fn accept_loop(inner: Arc<Inner>, listener: TcpListener) {
    loop {
        tokio::select! {
            _ = inner.shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => inner.admit(stream, addr),
                Err(e) => {
                    if !inner.running.load(Ordering::SeqCst) {
                        break;
                    }
                    tracing::warn!("Failed to accept client: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            },
        }
    }
    drop(listener);
    tracing::info!("Client acceptance task stopped");
}

async fn bind(address: &str, port: u16) -> std::io::Result<TcpListener> {
    let addr = lookup_host((address, port)).await?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} did not resolve to any address", address),
        )
    })?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Lock a mutex, recovering the data if a panicking holder poisoned it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
