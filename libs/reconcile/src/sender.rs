//! The seam between the reconciler and whatever carries commands to agents.

use fleet_proto::ControllerCommand;
use thiserror::Error;

/// The agent link is gone; the command was not handed to the transport.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("agent link closed")]
pub struct SendError;

/// Fire-and-forget delivery of a command to one agent.
///
/// `Ok` means the command was queued on the link, not that the agent acted on
/// it. Implementations must not block.
pub trait CommandSender {
    fn send(&self, command: ControllerCommand) -> Result<(), SendError>;
}
