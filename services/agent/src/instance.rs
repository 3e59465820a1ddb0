//! Local service instances.
//!
//! The instance manager:
//! - Allocates service IDs from the agent's own monotonic sequence
//! - Starts and stops workloads through the runtime
//! - Produces the status reports the agent sends to the controller
//!
//! It enforces no replica target; it only acts on commands and on workload
//! exits.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use fleet_id::{AgentId, ServiceId, ServiceIdSequence};
use fleet_proto::AgentMessage;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::runtime::{Runtime, WorkloadExit, WorkloadHandle};

/// A workload this agent is running.
#[derive(Debug)]
pub struct LocalInstance {
    pub start_time: DateTime<Utc>,
    handle: WorkloadHandle,
}

/// Instance manager.
pub struct InstanceManager {
    runtime: Arc<dyn Runtime>,
    sequence: ServiceIdSequence,
    instances: BTreeMap<ServiceId, LocalInstance>,
    exits: mpsc::UnboundedSender<WorkloadExit>,
}

impl InstanceManager {
    /// Create a manager and the receiver on which workload exits arrive.
    pub fn new(
        agent_id: AgentId,
        runtime: Arc<dyn Runtime>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkloadExit>) {
        let (exits, exits_rx) = mpsc::unbounded_channel();
        let manager = Self {
            runtime,
            sequence: ServiceIdSequence::new(agent_id),
            instances: BTreeMap::new(),
            exits,
        };
        (manager, exits_rx)
    }

    /// Start one new instance and return its `running` report.
    ///
    /// The service ID is consumed even if the workload fails to start.
    pub async fn start(&mut self) -> Result<AgentMessage> {
        let service_id = self.sequence.next_id();
        let handle = self
            .runtime
            .start(&service_id, self.exits.clone())
            .await?;
        let start_time = Utc::now();

        info!(service_id = %service_id, "Service started");
        self.instances
            .insert(service_id.clone(), LocalInstance { start_time, handle });

        Ok(AgentMessage::running(service_id, start_time))
    }

    /// Stop a local instance and return its `stopped` report, or `None` if
    /// the instance is not known here.
    pub fn stop(&mut self, service_id: &ServiceId) -> Option<AgentMessage> {
        let Some(instance) = self.instances.remove(service_id) else {
            debug!(service_id = %service_id, "Stop for unknown service ignored");
            return None;
        };
        instance.handle.stop();
        info!(service_id = %service_id, "Service stopped");
        Some(AgentMessage::stopped(service_id.clone()))
    }

    /// Forget an instance whose workload ended on its own and return its
    /// `stopped` report. Exits of instances already stopped are ignored.
    pub fn exited(&mut self, exit: &WorkloadExit) -> Option<AgentMessage> {
        self.instances.remove(&exit.service_id)?;
        info!(service_id = %exit.service_id, code = ?exit.code, "Service exited");
        Some(AgentMessage::stopped(exit.service_id.clone()))
    }

    /// Stop every local instance, returning a `stopped` report for each.
    pub fn stop_all(&mut self) -> Vec<AgentMessage> {
        let instances = std::mem::take(&mut self.instances);
        instances
            .into_iter()
            .map(|(service_id, instance)| {
                instance.handle.stop();
                info!(service_id = %service_id, "Service stopped");
                AgentMessage::stopped(service_id)
            })
            .collect()
    }

    /// `running` reports for every local instance.
    pub fn status_reports(&self) -> Vec<AgentMessage> {
        self.instances
            .iter()
            .map(|(service_id, instance)| {
                AgentMessage::running(service_id.clone(), instance.start_time)
            })
            .collect()
    }

    pub fn get(&self, service_id: &ServiceId) -> Option<&LocalInstance> {
        self.instances.get(service_id)
    }

    pub fn service_ids(&self) -> impl Iterator<Item = &ServiceId> {
        self.instances.keys()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
