//! Shared stopwatch broadcaster for co-op timer clients
//!
//! This crate provides a TCP server that owns a single stopwatch-like timer
//! (stopped / running / paused) and pushes its status to every connected
//! client whenever it changes. Clients may quit, and, when a shared secret is
//! configured, pause/resume or reset the timer.
//!
//! # Wire Protocol
//!
//! Plain text, newline-terminated by default ([`Framing::Newline`]), or the
//! legacy unframed mode ([`Framing::Raw`]).
//!
//! Server pushes:
//! - `end` - session terminating
//! - `stop` - timer stopped
//! - `running:<seconds>` / `paused:<seconds>` - elapsed time in decimal seconds
//!
//! Client commands:
//! - `quit` - always accepted
//! - `<secret>pause` - toggle pause (secret configured only)
//! - `<secret>reset` - reset to zero (secret configured only)
//!
//! A new client receives the current status immediately after connecting.
//!
//! # Example Usage
//!
//! ```no_run
//! use coop_timer_broadcaster::{BroadcasterConfig, TimerBroadcaster};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broadcaster = TimerBroadcaster::new(BroadcasterConfig {
//!         secret: Some("hunter2".to_string()),
//!         ..Default::default()
//!     });
//!     let addr = broadcaster.start().await?;
//!     println!("listening on {addr}");
//!
//!     broadcaster.start_timer();
//!     broadcaster.pause_timer();
//!     broadcaster.reset_timer();
//!
//!     broadcaster.kill().await;
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod client;
pub mod error;
pub mod events;
pub mod timer;

// Re-exports
pub use broadcaster::{BroadcasterConfig, TimerAction, TimerBroadcaster, DEFAULT_ADDRESS, DEFAULT_PORT};
pub use client::{ClientSession, SessionHandler, SessionId};
pub use error::{BroadcasterError, Result};
pub use events::{ClientCommand, Framing, ServerMessage};
pub use timer::{TimerState, TimerStatus};
