use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;

use crate::trigger::TriggerRule;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What a single poll of the log file did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The file does not exist (yet)
    Missing,
    /// Modification time and length are unchanged since the last scan
    Unchanged,
    Scanned {
        new_lines: usize,
        matched: usize,
        /// The file had fewer lines than already processed and was rescanned from the top
        rotated: bool,
    },
}

/// Follows a growing text file and runs trigger rules on each new line.
pub struct LogTailer {
    path: PathBuf,
    rules: Vec<TriggerRule>,
    last_line_count: usize,
    last_seen: Option<(Option<SystemTime>, u64)>,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rules: Vec::new(),
            last_line_count: 0,
            last_seen: None,
        }
    }

    pub fn add_rule(&mut self, rule: TriggerRule) {
        self.rules.push(rule);
    }

    /// Number of lines already evaluated
    pub fn last_line_count(&self) -> usize {
        self.last_line_count
    }

    /// Check the file once, evaluating every rule against lines appended
    /// since the previous scan.
    ///
    /// An unterminated last line counts as read; text later appended to it
    /// without a new line is not evaluated again.
    pub async fn poll(&mut self) -> io::Result<TickOutcome> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(TickOutcome::Missing),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TickOutcome::Missing),
            Err(e) => return Err(e),
        };

        let stamp = (metadata.modified().ok(), metadata.len());
        if self.last_seen == Some(stamp) {
            return Ok(TickOutcome::Unchanged);
        }

        let bytes = tokio::fs::read(&self.path).await?;
        let content = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = content.lines().collect();

        let rotated = lines.len() < self.last_line_count;
        if rotated {
            tracing::info!(
                "{} shrank to {} lines, rescanning from the start",
                self.path.display(),
                lines.len()
            );
            self.last_line_count = 0;
        }

        let fresh = &lines[self.last_line_count..];
        let mut matched = 0;
        for line in fresh {
            for rule in &self.rules {
                if rule.check(line) {
                    matched += 1;
                    tracing::info!("Detected \"{}\"", rule.description());
                }
            }
        }

        self.last_line_count = lines.len();
        self.last_seen = Some(stamp);

        Ok(TickOutcome::Scanned {
            new_lines: fresh.len(),
            matched,
            rotated,
        })
    }

    /// Move the tailer onto a background task polling every `poll_interval`.
    pub fn spawn(self, poll_interval: Duration) -> TailerHandle {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let task = tokio::spawn(async move {
            let mut tailer = self;
            tailer.run(&flag, poll_interval).await;
            tailer
        });
        TailerHandle { running, task }
    }

    async fn run(&mut self, running: &AtomicBool, poll_interval: Duration) {
        tracing::info!(
            "Watching {} with {} trigger rule(s)",
            self.path.display(),
            self.rules.len()
        );

        while running.load(Ordering::SeqCst) {
            tokio::time::sleep(poll_interval).await;
            match self.poll().await {
                Ok(TickOutcome::Scanned {
                    new_lines, matched, ..
                }) => {
                    tracing::debug!("Scanned {} new line(s), {} match(es)", new_lines, matched);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                }
            }
        }

        tracing::info!("Stopped watching {}", self.path.display());
    }
}

/// Control handle for a spawned [`LogTailer`]
pub struct TailerHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<LogTailer>,
}

impl TailerHandle {
    /// Ask the loop to exit; it notices at the top of its next iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Wait for the loop to exit, getting the tailer back
    pub async fn join(self) -> Option<LogTailer> {
        self.task.await.ok()
    }

    pub async fn shutdown(self) -> Option<LogTailer> {
        self.stop();
        self.join().await
    }
}
