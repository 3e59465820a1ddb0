//! Controller actor and its handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleet_id::AgentId;
use fleet_proto::AgentMessage;
use fleet_reconcile::{
    agent_lost, reconcile, DesiredReplicas, FleetRegistry, ReconcileStats, UpsertOutcome,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, instrument, warn};

use super::link::AgentLink;
use super::status::FleetStatus;

/// Mailbox capacity of the controller actor.
const MAILBOX_CAPACITY: usize = 1024;

/// Errors returned by [`ControllerHandle`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ControllerError {
    /// The controller actor has stopped.
    #[error("controller stopped")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    Up,
    Down,
}

/// Messages handled by the controller actor.
#[derive(Debug)]
pub enum ControllerEvent {
    /// An agent link was opened.
    AgentConnected {
        agent_id: AgentId,
        connection: u64,
        link: AgentLink,
    },

    /// A decoded frame arrived on an agent link.
    AgentMessage {
        agent_id: AgentId,
        message: AgentMessage,
    },

    /// An agent link closed. Sent exactly once per connection.
    AgentDisconnected { agent_id: AgentId, connection: u64 },

    /// Change the desired replica count and reconcile immediately.
    Scale {
        direction: ScaleDirection,
        count: u32,
        reply: oneshot::Sender<DesiredReplicas>,
    },

    /// Snapshot the fleet.
    Status { reply: oneshot::Sender<FleetStatus> },
}

/// Cloneable handle for sending events to the controller actor.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerEvent>,
    connections: Arc<AtomicU64>,
}

impl ControllerHandle {
    /// Allocate a number for a newly accepted agent connection.
    pub fn next_connection(&self) -> u64 {
        self.connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn send(&self, event: ControllerEvent) -> Result<(), ControllerError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ControllerError::Stopped)
    }

    pub async fn agent_connected(
        &self,
        agent_id: AgentId,
        connection: u64,
        link: AgentLink,
    ) -> Result<(), ControllerError> {
        self.send(ControllerEvent::AgentConnected {
            agent_id,
            connection,
            link,
        })
        .await
    }

    pub async fn agent_message(
        &self,
        agent_id: AgentId,
        message: AgentMessage,
    ) -> Result<(), ControllerError> {
        self.send(ControllerEvent::AgentMessage { agent_id, message })
            .await
    }

    pub async fn agent_disconnected(
        &self,
        agent_id: AgentId,
        connection: u64,
    ) -> Result<(), ControllerError> {
        self.send(ControllerEvent::AgentDisconnected {
            agent_id,
            connection,
        })
        .await
    }

    /// Increase the desired count by `count`; returns the new value.
    pub async fn scale_up(&self, count: u32) -> Result<DesiredReplicas, ControllerError> {
        self.scale(ScaleDirection::Up, count).await
    }

    /// Decrease the desired count by `count`, clamped at zero; returns the new value.
    pub async fn scale_down(&self, count: u32) -> Result<DesiredReplicas, ControllerError> {
        self.scale(ScaleDirection::Down, count).await
    }

    async fn scale(
        &self,
        direction: ScaleDirection,
        count: u32,
    ) -> Result<DesiredReplicas, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControllerEvent::Scale {
            direction,
            count,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ControllerError::Stopped)
    }

    pub async fn status(&self) -> Result<FleetStatus, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControllerEvent::Status { reply }).await?;
        rx.await.map_err(|_| ControllerError::Stopped)
    }
}

/// Owner of the fleet registry and the desired replica count.
pub struct ControllerActor {
    registry: FleetRegistry<AgentLink>,
    desired: DesiredReplicas,
    mailbox: mpsc::Receiver<ControllerEvent>,
    interval: Duration,
}

impl ControllerActor {
    /// Create the actor and a handle to it.
    pub fn new(desired: DesiredReplicas, interval: Duration) -> (Self, ControllerHandle) {
        let (tx, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let actor = Self {
            registry: FleetRegistry::new(),
            desired,
            mailbox,
            interval,
        };
        let handle = ControllerHandle {
            tx,
            connections: Arc::new(AtomicU64::new(0)),
        };
        (actor, handle)
    }

    /// Run until shutdown is signaled or every handle is dropped.
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            desired = self.desired.get(),
            "Starting controller"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_reconciliation();
                }
                event = self.mailbox.recv() => {
                    match event {
                        Some(event) => self.handle(event),
                        None => {
                            info!("All controller handles dropped");
                            break;
                        }
                    }
                }
                // A dropped sender counts as shutdown.
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        info!("Controller shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn handle(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::AgentConnected {
                agent_id,
                connection,
                link,
            } => self.handle_connected(agent_id, connection, link),
            ControllerEvent::AgentMessage { agent_id, message } => {
                self.handle_message(&agent_id, message)
            }
            ControllerEvent::AgentDisconnected {
                agent_id,
                connection,
            } => self.handle_disconnected(&agent_id, connection),
            ControllerEvent::Scale {
                direction,
                count,
                reply,
            } => {
                match direction {
                    ScaleDirection::Up => self.desired.scale_up(count),
                    ScaleDirection::Down => self.desired.scale_down(count),
                }
                info!(
                    direction = ?direction,
                    count,
                    desired = self.desired.get(),
                    "Desired replica count changed"
                );
                self.run_reconciliation();
                let _ = reply.send(self.desired);
            }
            ControllerEvent::Status { reply } => {
                let _ = reply.send(FleetStatus::snapshot(&self.registry, self.desired.get()));
            }
        }
    }

    fn handle_connected(&mut self, agent_id: AgentId, connection: u64, link: AgentLink) {
        if let Some(previous) = self
            .registry
            .register_agent(agent_id.clone(), link, connection)
        {
            warn!(
                agent_id = %agent_id,
                connection,
                previous_connection = previous.connection(),
                "Agent ID already registered, replacing link"
            );
        }
        info!(agent_id = %agent_id, connection, "Agent connected");
    }

    fn handle_message(&mut self, agent_id: &AgentId, message: AgentMessage) {
        match message {
            AgentMessage::AgentStatus {
                status,
                agent_id: reported_id,
            } => {
                if &reported_id != agent_id {
                    warn!(
                        agent_id = %agent_id,
                        reported_id = %reported_id,
                        "Agent reported a different ID than it connected with"
                    );
                }
                match self.registry.set_agent_status(agent_id, status.clone()) {
                    Ok(()) => debug!(agent_id = %agent_id, status = %status, "Agent status updated"),
                    Err(e) => debug!(error = %e, "Ignoring agent status"),
                }
            }
            AgentMessage::ServiceStatus { service_id, status } => {
                match self
                    .registry
                    .upsert_instance(service_id.clone(), agent_id, status)
                {
                    Ok(UpsertOutcome::Inserted) => {
                        info!(service_id = %service_id, agent_id = %agent_id, "Service registered")
                    }
                    Ok(UpsertOutcome::Removed) => {
                        info!(service_id = %service_id, agent_id = %agent_id, "Service stopped")
                    }
                    Ok(UpsertOutcome::Updated) | Ok(UpsertOutcome::Absent) => {}
                    Err(e) => {
                        warn!(service_id = %service_id, error = %e, "Ignoring service status")
                    }
                }
            }
        }
    }

    fn handle_disconnected(&mut self, agent_id: &AgentId, connection: u64) {
        match agent_lost(&mut self.registry, agent_id, connection, self.desired) {
            Some(loss) => {
                info!(
                    agent_id = %agent_id,
                    connection,
                    lost_services = loss.lost.len(),
                    "Agent disconnected"
                );
            }
            None => {
                debug!(
                    agent_id = %agent_id,
                    connection,
                    "Stale connection closed, agent registration kept"
                );
            }
        }
    }

    fn run_reconciliation(&mut self) -> ReconcileStats {
        reconcile(&mut self.registry, self.desired)
    }
}
