use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timer::TimerStatus;

/// Messages pushed from the server to clients
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Session is terminating
    End,
    /// Timer is stopped
    Stop,
    /// Timer is running or paused, with elapsed seconds
    Status { status: TimerStatus, seconds: f64 },
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::End => f.write_str("end"),
            ServerMessage::Stop => f.write_str("stop"),
            ServerMessage::Status { status, seconds } => {
                write!(f, "{}:{}", status.as_str(), format_seconds(*seconds))
            }
        }
    }
}

/// Decimal seconds, always with a fractional part ("12.0", "3.25")
fn format_seconds(seconds: f64) -> String {
    let mut text = seconds.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

/// Commands a client may send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    Quit,
    TogglePause,
    Reset,
}

impl ClientCommand {
    /// Parse one command frame.
    ///
    /// `quit` is always accepted. The privileged `<secret>pause` and
    /// `<secret>reset` commands only exist when a secret is configured.
    /// Anything else yields `None` and is ignored by the caller.
    pub fn parse(input: &str, secret: Option<&str>) -> Option<Self> {
        if input == "quit" {
            return Some(Self::Quit);
        }
        let action = input.strip_prefix(secret?)?;
        match action {
            "pause" => Some(Self::TogglePause),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

/// How messages are delimited on the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Every push ends with `\n`; input is split into lines.
    #[default]
    Newline,
    /// Legacy: one write per push, one read per command.
    Raw,
}

impl Framing {
    pub fn encode(&self, message: &ServerMessage) -> Vec<u8> {
        match self {
            Framing::Newline => format!("{}\n", message).into_bytes(),
            Framing::Raw => message.to_string().into_bytes(),
        }
    }
}

/// Maximum unterminated input kept while waiting for a newline
pub const MAX_PENDING_INPUT: usize = 4096;

/// Splits newline-framed input into complete commands.
///
/// Bytes are buffered undecoded so a UTF-8 sequence split across reads is
/// reassembled before the line is turned into text.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        if self.pending.len() > MAX_PENDING_INPUT {
            tracing::warn!(
                "Discarding {} bytes of unterminated client input",
                self.pending.len()
            );
            self.pending.clear();
        }

        lines
    }
}
