//! Fleet agent library.
//!
//! The agent keeps a persistent link to the controller and runs service
//! instances on command. It is purely reactive: it starts and stops
//! workloads when told to, reports what it runs, and never enforces a
//! replica target of its own.
//!
//! ## Modules
//!
//! - `agent`: connection loop and command handling
//! - `instance`: local instance bookkeeping and status reports
//! - `runtime`: workload runtime interface (process and mock)
//! - `client`: WebSocket connection to the controller
//! - `backoff`: reconnect delays

pub mod agent;
pub mod backoff;
pub mod client;
pub mod config;
pub mod instance;
pub mod runtime;

// Re-export commonly used types
pub use agent::Agent;
pub use config::Config;
pub use instance::InstanceManager;
pub use runtime::{MockRuntime, ProcessRuntime, Runtime};
