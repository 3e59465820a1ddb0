//! The controller actor.
//!
//! All fleet state (registry and desired replica count) is owned by a single
//! tokio task. Agent links, the admin API and the control-loop timer talk to
//! it through its mailbox, so events are handled strictly one at a time and a
//! reconciliation pass never overlaps another.
//!
//! Triggers for a reconciliation pass:
//! - the periodic timer
//! - an agent's link closing (after its instances are removed)
//! - a scale-up or scale-down request

mod actor;
mod link;
mod status;

pub use actor::{ControllerActor, ControllerError, ControllerEvent, ControllerHandle, ScaleDirection};
pub use link::AgentLink;
pub use status::{AgentSummary, FleetStatus, ServiceSummary};
