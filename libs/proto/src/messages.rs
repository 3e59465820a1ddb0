//! Message vocabulary of the agent link.

use chrono::{DateTime, Utc};
use fleet_id::{AgentId, ServiceId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::ProtoError;

/// A message that travels as a single text frame.
pub trait Frame: Serialize + DeserializeOwned {
    /// Encode the message as a JSON text frame.
    fn to_frame(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(ProtoError::Encode)
    }

    /// Decode a JSON text frame.
    fn from_frame(text: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(text).map_err(ProtoError::Malformed)
    }
}

// =============================================================================
// Agent → Controller
// =============================================================================

/// Messages sent by an agent to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AgentMessage {
    /// Lifecycle signal, sent right after the link opens.
    AgentStatus {
        status: AgentStatus,
        #[serde(rename = "agentId")]
        agent_id: AgentId,
    },

    /// State of one local instance, sent on change and on every report tick.
    ServiceStatus {
        #[serde(rename = "serviceId")]
        service_id: ServiceId,
        status: ServiceState,
    },
}

impl Frame for AgentMessage {}

impl AgentMessage {
    pub fn connected(agent_id: AgentId) -> Self {
        Self::AgentStatus {
            status: AgentStatus::Connected,
            agent_id,
        }
    }

    pub fn running(service_id: ServiceId, start_time: DateTime<Utc>) -> Self {
        Self::ServiceStatus {
            service_id,
            status: ServiceState::Running { start_time },
        }
    }

    pub fn stopped(service_id: ServiceId) -> Self {
        Self::ServiceStatus {
            service_id,
            status: ServiceState::Stopped,
        }
    }
}

/// Agent-reported status string. `connected` is the only value the
/// controller itself interprets; anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentStatus {
    Connected,
    Other(String),
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for AgentStatus {
    fn from(s: String) -> Self {
        if s == "connected" {
            Self::Connected
        } else {
            Self::Other(s)
        }
    }
}

impl From<AgentStatus> for String {
    fn from(status: AgentStatus) -> Self {
        match status {
            AgentStatus::Connected => "connected".to_string(),
            AgentStatus::Other(s) => s,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ServiceState {
    Running {
        #[serde(rename = "startTime")]
        start_time: DateTime<Utc>,
    },
    Stopped,
}

impl ServiceState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Running { start_time } => Some(*start_time),
            Self::Stopped => None,
        }
    }
}

// =============================================================================
// Controller → Agent
// =============================================================================

/// Commands sent by the controller to one agent. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControllerCommand {
    /// Spawn one new instance of the payload.
    StartService,

    /// Terminate the named local instance.
    StopService {
        #[serde(rename = "serviceId")]
        service_id: ServiceId,
    },
}

impl Frame for ControllerCommand {}
