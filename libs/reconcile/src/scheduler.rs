//! Least-loaded placement.

use std::collections::BTreeMap;

use fleet_id::AgentId;

use crate::registry::FleetRegistry;

/// Picks the agent that receives the next instance.
///
/// Load is the number of instances the registry assigns to an agent, plus
/// any placements reserved on this scheduler. Ties go to the lowest agent ID.
#[derive(Debug, Default)]
pub struct Scheduler {
    reserved: BTreeMap<AgentId, usize>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the least-loaded registered agent, or `None` if there are no
    /// agents. `None` means placement is deferred; nothing else changes.
    pub fn pick_agent<L>(&self, registry: &FleetRegistry<L>) -> Option<AgentId> {
        registry
            .loads()
            .into_iter()
            .map(|(agent_id, load)| {
                let reserved = self.reserved.get(agent_id).copied().unwrap_or(0);
                (load + reserved, agent_id)
            })
            .min()
            .map(|(_, agent_id)| agent_id.clone())
    }

    /// Count a start already sent to `agent_id` as load until this scheduler
    /// is dropped.
    pub fn reserve(&mut self, agent_id: &AgentId) {
        *self.reserved.entry(agent_id.clone()).or_insert(0) += 1;
    }
}
