//! # fleet-proto
//!
//! The control protocol spoken between agents and the controller over the
//! agent link. Every frame is one JSON object sent as a WebSocket text message.
//!
//! ## Agent → controller (tagged by `type`)
//!
//! ```json
//! {"type":"agentStatus","status":"connected","agentId":"a1"}
//! {"type":"serviceStatus","serviceId":"a1-service-1","status":{"status":"running","startTime":"2024-05-01T10:00:00Z"}}
//! {"type":"serviceStatus","serviceId":"a1-service-1","status":{"status":"stopped"}}
//! ```
//!
//! ## Controller → agent (tagged by `action`)
//!
//! ```json
//! {"action":"startService"}
//! {"action":"stopService","serviceId":"a1-service-1"}
//! ```
//!
//! Delivery is best-effort: there are no acknowledgements, and frames are only
//! ordered within one connection.

mod error;
mod messages;

use std::time::Duration;

pub use error::ProtoError;
pub use messages::*;

/// Header carrying the agent identity when the link is opened.
pub const AGENT_ID_HEADER: &str = "Agent-ID";

/// Period of the agent's full status report and of the controller's control loop.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);
