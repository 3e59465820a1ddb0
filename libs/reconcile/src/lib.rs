//! Reconciliation loop primitives.
//!
//! This library holds the controller's decision-making core, independent of
//! any transport or runtime:
//!
//! - **Fleet registry**: the authoritative map of connected agents and the
//!   service instances they reported.
//! - **Scheduler**: picks the least-loaded agent for a new instance.
//! - **Reconciler**: one pass comparing the desired replica count with the
//!   registry and sending start/stop commands to close the gap.
//!
//! # Invariants
//!
//! - The registry's instance count is the only input to a pass
//! - A pass runs to completion before the next one starts (callers own the
//!   registry exclusively, so this is enforced by `&mut`)
//! - Decisions are deterministic given the same registry contents
//! - Commands are fire-and-forget; a lost command is repaired by a later pass

mod desired;
mod reconciler;
mod registry;
mod scheduler;
mod sender;

use std::time::Duration;

pub use desired::DesiredReplicas;
pub use reconciler::{agent_lost, reconcile, AgentLoss, ReconcileStats};
pub use registry::{
    AgentEntry, FleetRegistry, InstanceRecord, RegistryError, UnregisteredAgent, UpsertOutcome,
};
pub use scheduler::Scheduler;
pub use sender::{CommandSender, SendError};

/// Default reconciliation interval.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = fleet_proto::DEFAULT_REPORT_INTERVAL;
