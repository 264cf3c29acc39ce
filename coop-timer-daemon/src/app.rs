//! Wires the log triggers into the timer broadcaster

use anyhow::{Context, Result};
use std::net::SocketAddr;

use coop_timer_broadcaster::TimerBroadcaster;
use coop_timer_logwatch::{LogTailer, TailerHandle, TriggerRule};

use crate::config::{DaemonConfig, TriggerConfig, TriggerMatch};

/// Running server plus its log tailer
pub struct TimerApp {
    broadcaster: TimerBroadcaster,
    tailer: TailerHandle,
    local_addr: SocketAddr,
}

impl TimerApp {
    /// Bind the server, then start following the log file
    pub async fn start(config: &DaemonConfig) -> Result<Self> {
        let broadcaster = TimerBroadcaster::new(config.broadcaster_config());
        let rules = build_rules(&config.triggers, &broadcaster)?;

        let local_addr = broadcaster
            .start()
            .await
            .context("Failed to start timer server")?;

        let mut tailer = LogTailer::new(config.log_file());
        for rule in rules {
            tailer.add_rule(rule);
        }
        let tailer = tailer.spawn(config.poll_interval());

        Ok(Self {
            broadcaster,
            tailer,
            local_addr,
        })
    }

    pub fn broadcaster(&self) -> &TimerBroadcaster {
        &self.broadcaster
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the tailer first so no trigger fires into a dead server
    pub async fn shutdown(self) {
        self.tailer.shutdown().await;
        self.broadcaster.kill().await;
    }
}

/// Turn trigger configuration into rules acting on `broadcaster`
pub fn build_rules(
    triggers: &[TriggerConfig],
    broadcaster: &TimerBroadcaster,
) -> Result<Vec<TriggerRule>> {
    triggers
        .iter()
        .map(|trigger| -> Result<TriggerRule> {
            let target = broadcaster.clone();
            let action = trigger.action;
            let fire = move || target.apply(action);
            let rule = match &trigger.matcher {
                TriggerMatch::Contains(phrase) => TriggerRule::contains(phrase.clone(), fire),
                TriggerMatch::Pattern(pattern) => TriggerRule::pattern(pattern, fire)?,
            };
            Ok(rule)
        })
        .collect()
}
