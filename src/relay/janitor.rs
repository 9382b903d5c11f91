//! SessionJanitor - removes detached sessions once their grace period is over
//!
//! Disconnected machines keep their window for `grace` so a quick reconnect
//! picks up where it left off. The janitor sweeps the registry on a fixed
//! interval and drops everything that stayed detached for longer, measured on
//! the same clock the dispatcher stamps detaches with.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};

use super::clock::Clock;
use super::messages::JanitorCommand;
use super::registry::SessionRegistry;

pub struct SessionJanitor {
    registry: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
    grace_secs: i64,
    sweep_interval: Duration,
    command_rx: mpsc::Receiver<JanitorCommand>,
}

impl SessionJanitor {
    pub fn new(
        registry: Arc<SessionRegistry>,
        clock: Arc<dyn Clock>,
        grace: Duration,
        sweep_interval: Duration,
        command_rx: mpsc::Receiver<JanitorCommand>,
    ) -> Self {
        Self {
            registry,
            clock,
            grace_secs: i64::try_from(grace.as_secs()).unwrap_or(i64::MAX),
            sweep_interval,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!(
            "starting session janitor (grace {}s, every {:?})",
            self.grace_secs,
            self.sweep_interval
        );

        let mut ticker = interval(self.sweep_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        JanitorCommand::SweepNow { respond_to } => {
                            let removed = self.sweep().await;
                            let _ = respond_to.send(removed);
                        }

                        JanitorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("session janitor stopped");
    }

    async fn sweep(&self) -> Vec<String> {
        let removed = self
            .registry
            .remove_expired(self.clock.now(), self.grace_secs)
            .await;

        for machine_id in &removed {
            info!("session for machine {machine_id} expired after grace period");
        }

        removed
    }
}

/// Handle for controlling the SessionJanitor
#[derive(Clone)]
pub struct JanitorHandle {
    sender: mpsc::Sender<JanitorCommand>,
}

impl JanitorHandle {
    pub fn spawn(
        registry: Arc<SessionRegistry>,
        clock: Arc<dyn Clock>,
        grace: Duration,
        sweep_interval: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let janitor = SessionJanitor::new(registry, clock, grace, sweep_interval, cmd_rx);
        tokio::spawn(janitor.run());

        Self { sender: cmd_tx }
    }

    /// Sweep now, returning the machine ids that were removed
    pub async fn sweep_now(&self) -> Result<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(JanitorCommand::SweepNow { respond_to: tx })
            .await
            .context("failed to send SweepNow command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(JanitorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
