//! # fleet-id
//!
//! Identity types shared by the controller and the agents.
//!
//! ## ID Format
//!
//! - `AgentId`: an opaque string supplied by the agent at connect time
//!   (e.g. `agent-eu-1`). When omitted the receiving side generates
//!   `agent-<n>` with `n` drawn from `0..1000`. That fallback is NOT a strong
//!   identity scheme: two anonymous agents can collide.
//! - `ServiceId`: `{agentId}-service-{counter}`, where `counter` is a per-agent
//!   monotonic sequence starting at 1. Uniqueness follows from the agent id
//!   plus the counter, without coordination with the controller.
//!
//! Both types are strings on the wire and parse strictly on the way in
//! (non-empty, no whitespace or control characters).

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;
