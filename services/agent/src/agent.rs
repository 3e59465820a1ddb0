//! Agent event loop.
//!
//! One session per controller link: on open the agent announces itself and
//! reports every local instance, then reacts to commands, workload exits
//! and the report tick until the link closes. Between sessions it waits with
//! exponential backoff and reconnects; local instances keep running.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use fleet_proto::{AgentMessage, ControllerCommand, Frame};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use crate::backoff::BackoffPolicy;
use crate::client::{self, ControllerSocket};
use crate::config::Config;
use crate::instance::InstanceManager;
use crate::runtime::{Runtime, WorkloadExit};

type FrameSink = SplitSink<ControllerSocket, Message>;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The link closed; reconnect.
    Closed,
    /// Shutdown was requested.
    Shutdown,
}

pub struct Agent {
    config: Config,
    instances: InstanceManager,
    exits: mpsc::UnboundedReceiver<WorkloadExit>,
    backoff: BackoffPolicy,
}

impl Agent {
    pub fn new(config: Config, runtime: Arc<dyn Runtime>) -> Self {
        let (instances, exits) = InstanceManager::new(config.agent_id.clone(), runtime);
        Self {
            config,
            instances,
            exits,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run until shutdown is signaled. Every local workload is stopped
    /// before returning.
    #[instrument(skip(self, shutdown), fields(agent_id = %self.config.agent_id))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(url = %self.config.controller_url, "Starting agent");

        let mut attempt: u32 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let connected = tokio::select! {
                result = client::connect(&self.config.controller_url, &self.config.agent_id) => result,
                _ = shutdown.changed() => break,
            };

            match connected {
                Ok(socket) => {
                    attempt = 0;
                    info!("Connected to controller");
                    match self.session(socket, &mut shutdown).await {
                        Ok(SessionEnd::Shutdown) => break,
                        Ok(SessionEnd::Closed) => info!("Controller link closed"),
                        Err(e) => warn!(error = %e, "Controller link failed"),
                    }
                }
                Err(e) => warn!(error = %e, attempt, "Failed to connect to controller"),
            }

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            info!(delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");
            if self.wait_disconnected(delay, &mut shutdown).await == SessionEnd::Shutdown {
                break;
            }
        }

        let stopped = self.instances.stop_all();
        info!(stopped = stopped.len(), "Agent shut down");
    }

    /// Sleep for `delay` while still reaping workload exits.
    async fn wait_disconnected(
        &mut self,
        delay: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return SessionEnd::Closed,
                Some(exit) = self.exits.recv() => {
                    // Nobody to tell; the controller dropped our instances
                    // when the link closed.
                    let _ = self.instances.exited(&exit);
                }
                _ = shutdown.changed() => return SessionEnd::Shutdown,
            }
        }
    }

    async fn session(
        &mut self,
        socket: ControllerSocket,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd> {
        let (mut sink, mut stream) = socket.split();

        send(&mut sink, &AgentMessage::connected(self.config.agent_id.clone())).await?;
        for report in self.instances.status_reports() {
            send(&mut sink, &report).await?;
        }

        let mut ticker = tokio::time::interval(self.config.report_interval);
        // Don't immediately tick; the full report was just sent.
        ticker.tick().await;

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match ControllerCommand::from_frame(text.as_str()) {
                            Ok(command) => {
                                if let Some(report) = self.handle_command(command).await {
                                    send(&mut sink, &report).await?;
                                }
                            }
                            Err(e) => warn!(error = %e, "Dropping malformed command"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
                Some(exit) = self.exits.recv() => {
                    if let Some(report) = self.instances.exited(&exit) {
                        send(&mut sink, &report).await?;
                    }
                }
                _ = ticker.tick() => {
                    let reports = self.instances.status_reports();
                    debug!(instances = reports.len(), "Sending status report");
                    for report in reports {
                        send(&mut sink, &report).await?;
                    }
                }
                _ = shutdown.changed() => {
                    info!("Stopping local services");
                    for report in self.instances.stop_all() {
                        if send(&mut sink, &report).await.is_err() {
                            break;
                        }
                    }
                    let _ = sink.close().await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }

    async fn handle_command(&mut self, command: ControllerCommand) -> Option<AgentMessage> {
        match command {
            ControllerCommand::StartService => match self.instances.start().await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "Failed to start service");
                    None
                }
            },
            ControllerCommand::StopService { service_id } => self.instances.stop(&service_id),
        }
    }
}

async fn send(sink: &mut FrameSink, message: &AgentMessage) -> Result<()> {
    let frame = message.to_frame()?;
    sink.send(Message::Text(frame.into())).await?;
    Ok(())
}
