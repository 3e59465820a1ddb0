//! Sending half of an agent link, as held by the registry.

use fleet_proto::ControllerCommand;
use fleet_reconcile::{CommandSender, SendError};
use tokio::sync::mpsc;

/// Queue of commands for one agent connection.
///
/// The connection's writer task drains the queue onto the socket. The queue is
/// unbounded so that sending never blocks the controller.
#[derive(Debug, Clone)]
pub struct AgentLink {
    tx: mpsc::UnboundedSender<ControllerCommand>,
}

impl AgentLink {
    /// Create a link and the receiver its writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ControllerCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl CommandSender for AgentLink {
    fn send(&self, command: ControllerCommand) -> Result<(), SendError> {
        self.tx.send(command).map_err(|_| SendError)
    }
}
