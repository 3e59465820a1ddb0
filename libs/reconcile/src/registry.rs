//! Fleet registry: the controller's view of agents and service instances.
//!
//! Pure state holder. Every mutation takes effect immediately; the owner is
//! expected to serialize access (the controller runs it on a single task).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fleet_id::{AgentId, ServiceId};
use fleet_proto::{AgentStatus, ServiceState};
use thiserror::Error;

/// Registry errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The agent is not (or no longer) registered.
    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),
}

/// A registered agent and the handle used to send it commands.
#[derive(Debug)]
pub struct AgentEntry<L> {
    link: L,
    connection: u64,
    status: AgentStatus,
}

impl<L> AgentEntry<L> {
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Connection number the agent registered under.
    pub fn connection(&self) -> u64 {
        self.connection
    }

    pub fn status(&self) -> &AgentStatus {
        &self.status
    }
}

/// A service instance known to be running on an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub agent_id: AgentId,
    pub start_time: DateTime<Utc>,
}

/// Effect of an instance status report on the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First report for this instance.
    Inserted,
    /// The instance was already known; its record was replaced.
    Updated,
    /// A `stopped` report removed the instance.
    Removed,
    /// A `stopped` report for an instance the registry does not hold.
    Absent,
}

/// Result of removing an agent.
#[derive(Debug)]
pub struct UnregisteredAgent<L> {
    pub entry: AgentEntry<L>,
    /// Instances that were owned by the agent and are now presumed lost.
    pub lost: Vec<ServiceId>,
}

/// Authoritative mapping of agents and service instances.
///
/// Both maps are ordered by ID, which makes every iteration (and therefore
/// every scheduling and scale-down decision) deterministic.
#[derive(Debug)]
pub struct FleetRegistry<L> {
    agents: BTreeMap<AgentId, AgentEntry<L>>,
    instances: BTreeMap<ServiceId, InstanceRecord>,
}

impl<L> Default for FleetRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L> FleetRegistry<L> {
    pub fn new() -> Self {
        Self {
            agents: BTreeMap::new(),
            instances: BTreeMap::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Register an agent under `connection`, with status `connected`.
    ///
    /// A second registration under the same ID replaces the link of the first
    /// and returns the replaced entry. Instances already reported under that
    /// ID are kept.
    pub fn register_agent(
        &mut self,
        agent_id: AgentId,
        link: L,
        connection: u64,
    ) -> Option<AgentEntry<L>> {
        self.agents.insert(
            agent_id,
            AgentEntry {
                link,
                connection,
                status: AgentStatus::Connected,
            },
        )
    }

    /// Remove an agent and every instance it owns.
    pub fn unregister_agent(&mut self, agent_id: &AgentId) -> Option<UnregisteredAgent<L>> {
        let entry = self.agents.remove(agent_id)?;

        let lost: Vec<ServiceId> = self
            .instances
            .iter()
            .filter(|(_, record)| &record.agent_id == agent_id)
            .map(|(service_id, _)| service_id.clone())
            .collect();

        for service_id in &lost {
            self.instances.remove(service_id);
        }

        Some(UnregisteredAgent { entry, lost })
    }

    /// Remove an agent only if it is still registered under `connection`.
    ///
    /// Used when a link closes: if the ID was meanwhile claimed by a newer
    /// connection, the live registration is left alone.
    pub fn unregister_connection(
        &mut self,
        agent_id: &AgentId,
        connection: u64,
    ) -> Option<UnregisteredAgent<L>> {
        match self.agents.get(agent_id) {
            Some(entry) if entry.connection == connection => self.unregister_agent(agent_id),
            _ => None,
        }
    }

    /// Apply a status report from `agent_id` about `service_id`.
    ///
    /// `Running` inserts or replaces the record; `Stopped` removes it without
    /// keeping a tombstone, and is a no-op for an instance already gone.
    pub fn upsert_instance(
        &mut self,
        service_id: ServiceId,
        agent_id: &AgentId,
        state: ServiceState,
    ) -> Result<UpsertOutcome, RegistryError> {
        if !self.agents.contains_key(agent_id) {
            return Err(RegistryError::UnknownAgent(agent_id.clone()));
        }

        let outcome = match state {
            ServiceState::Running { start_time } => {
                let record = InstanceRecord {
                    agent_id: agent_id.clone(),
                    start_time,
                };
                match self.instances.insert(service_id, record) {
                    Some(_) => UpsertOutcome::Updated,
                    None => UpsertOutcome::Inserted,
                }
            }
            ServiceState::Stopped => match self.instances.remove(&service_id) {
                Some(_) => UpsertOutcome::Removed,
                None => UpsertOutcome::Absent,
            },
        };

        Ok(outcome)
    }

    /// Drop an instance from the registry regardless of its owner.
    pub fn remove_instance(&mut self, service_id: &ServiceId) -> Option<InstanceRecord> {
        self.instances.remove(service_id)
    }

    pub fn set_agent_status(
        &mut self,
        agent_id: &AgentId,
        status: AgentStatus,
    ) -> Result<(), RegistryError> {
        let entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::UnknownAgent(agent_id.clone()))?;
        entry.status = status;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn total_instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Number of instances assigned to `agent_id`.
    pub fn agent_load(&self, agent_id: &AgentId) -> usize {
        self.instances
            .values()
            .filter(|record| &record.agent_id == agent_id)
            .count()
    }

    /// Load of every registered agent, in agent ID order.
    pub fn loads(&self) -> BTreeMap<&AgentId, usize> {
        let mut loads: BTreeMap<&AgentId, usize> =
            self.agents.keys().map(|id| (id, 0)).collect();
        for record in self.instances.values() {
            if let Some(load) = loads.get_mut(&record.agent_id) {
                *load += 1;
            }
        }
        loads
    }

    /// Registered agent IDs in ascending order.
    pub fn agent_ids(&self) -> impl Iterator<Item = &AgentId> {
        self.agents.keys()
    }

    pub fn agent(&self, agent_id: &AgentId) -> Option<&AgentEntry<L>> {
        self.agents.get(agent_id)
    }

    pub fn agents(&self) -> impl Iterator<Item = (&AgentId, &AgentEntry<L>)> {
        self.agents.iter()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn instance(&self, service_id: &ServiceId) -> Option<&InstanceRecord> {
        self.instances.get(service_id)
    }

    /// Known instances in service ID order.
    pub fn instances(&self) -> impl Iterator<Item = (&ServiceId, &InstanceRecord)> {
        self.instances.iter()
    }
}
