//! Typed ID definitions for agents and service instances.

use rand::Rng;

use crate::define_string_id;

/// Upper bound (exclusive) of the numeric suffix of generated agent IDs.
pub const FALLBACK_AGENT_ID_RANGE: u32 = 1000;

/// Separator between the owning agent and the counter in a service ID.
const SERVICE_SEPARATOR: &str = "-service-";

define_string_id!(
    /// Identity of an agent, supplied out-of-band when the link is opened.
    AgentId
);

define_string_id!(
    /// Identity of one service instance, `{agentId}-service-{counter}`.
    ServiceId
);

impl AgentId {
    /// Generates a fallback identity for an agent that did not supply one.
    ///
    /// Only `FALLBACK_AGENT_ID_RANGE` distinct values exist, so collisions
    /// between anonymous agents are possible.
    #[must_use]
    pub fn fallback() -> Self {
        let n = rand::rng().random_range(0..FALLBACK_AGENT_ID_RANGE);
        Self(format!("agent-{n}"))
    }
}

impl ServiceId {
    /// Derives the service ID for the `counter`-th instance started by `agent_id`.
    #[must_use]
    pub fn for_agent(agent_id: &AgentId, counter: u64) -> Self {
        Self(format!("{agent_id}{SERVICE_SEPARATOR}{counter}"))
    }

    /// Splits a derived ID back into its agent part and counter.
    ///
    /// Returns an error for IDs that were not produced by [`ServiceId::for_agent`].
    pub fn components(&self) -> Result<(&str, u64), crate::IdError> {
        let (agent, counter) = self.0.rsplit_once(SERVICE_SEPARATOR).ok_or_else(|| {
            crate::IdError::InvalidFormat {
                message: format!("missing '{SERVICE_SEPARATOR}' in '{}'", self.0),
            }
        })?;

        if agent.is_empty() {
            return Err(crate::IdError::InvalidFormat {
                message: format!("missing agent part in '{}'", self.0),
            });
        }

        let counter = counter
            .parse::<u64>()
            .map_err(|e| crate::IdError::InvalidFormat {
                message: format!("invalid counter in '{}': {e}", self.0),
            })?;

        Ok((agent, counter))
    }
}

/// Per-agent generator of service IDs.
///
/// The counter starts at 1, only moves forward, and is never reset for the
/// lifetime of the owning agent process.
#[derive(Debug, Clone)]
pub struct ServiceIdSequence {
    agent_id: AgentId,
    next: u64,
}

impl ServiceIdSequence {
    /// Creates a sequence for the given agent, starting at counter 1.
    #[must_use]
    pub fn new(agent_id: AgentId) -> Self {
        Self { agent_id, next: 1 }
    }

    /// Allocates the next service ID.
    pub fn next_id(&mut self) -> ServiceId {
        let id = ServiceId::for_agent(&self.agent_id, self.next);
        self.next += 1;
        id
    }
}

// =============================================================================
// Tests
// =============================================================================
