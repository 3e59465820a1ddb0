//! Point-in-time snapshot of the fleet, as served by `GET /status`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fleet_id::{AgentId, ServiceId};
use fleet_reconcile::FleetRegistry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStatus {
    pub agents: Vec<AgentSummary>,
    pub services: BTreeMap<ServiceId, ServiceSummary>,
    pub desired_replica_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: AgentId,
    pub status: String,
    pub load: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub agent_id: AgentId,
    pub status: String,
    pub start_time: DateTime<Utc>,
}

impl FleetStatus {
    pub fn snapshot<L>(registry: &FleetRegistry<L>, desired_replica_count: u32) -> Self {
        let loads = registry.loads();

        let agents = registry
            .agents()
            .map(|(id, entry)| AgentSummary {
                id: id.clone(),
                status: entry.status().to_string(),
                load: loads.get(id).copied().unwrap_or(0),
            })
            .collect();

        let services = registry
            .instances()
            .map(|(service_id, record)| {
                (
                    service_id.clone(),
                    ServiceSummary {
                        agent_id: record.agent_id.clone(),
                        status: "running".to_string(),
                        start_time: record.start_time,
                    },
                )
            })
            .collect();

        Self {
            agents,
            services,
            desired_replica_count,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.services.len()
    }
}
