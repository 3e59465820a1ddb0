//! One agent connection: reader loop plus a writer task.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::Response,
};
use fleet_id::AgentId;
use fleet_proto::{AgentMessage, Frame, AGENT_ID_HEADER};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::controller::{AgentLink, ControllerHandle};
use crate::state::AppState;

pub(super) async fn upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let agent_id = agent_id_from_headers(&headers);
    let controller = state.controller().clone();
    ws.on_upgrade(move |socket| serve_agent(socket, controller, agent_id))
}

/// Identity for a new connection: the `Agent-ID` header if it holds a valid
/// ID, otherwise a generated `agent-<n>`.
pub fn agent_id_from_headers(headers: &HeaderMap) -> AgentId {
    let supplied = headers.get(AGENT_ID_HEADER).map(|v| {
        let raw = String::from_utf8_lossy(v.as_bytes()).trim().to_string();
        let parsed = raw.parse::<AgentId>();
        (raw, parsed)
    });

    match supplied {
        Some((_, Ok(agent_id))) => agent_id,
        Some((raw, Err(e))) => {
            let agent_id = AgentId::fallback();
            warn!(
                header = %raw,
                error = %e,
                agent_id = %agent_id,
                "Invalid agent ID header, generated a fallback ID"
            );
            agent_id
        }
        None => {
            let agent_id = AgentId::fallback();
            warn!(agent_id = %agent_id, "Agent connected without an ID, generated a fallback ID");
            agent_id
        }
    }
}

/// Drive one agent connection until it closes.
///
/// Commands queued on the connection's [`AgentLink`] are written as text
/// frames. Incoming text frames are decoded and forwarded to the controller;
/// frames that fail to decode are logged and dropped without closing the
/// link. When the socket ends, the controller is told exactly once.
pub async fn serve_agent(socket: WebSocket, controller: ControllerHandle, agent_id: AgentId) {
    let connection = controller.next_connection();
    let (link, mut commands) = AgentLink::channel();

    if let Err(e) = controller
        .agent_connected(agent_id.clone(), connection, link)
        .await
    {
        warn!(agent_id = %agent_id, error = %e, "Rejecting agent connection");
        return;
    }

    let (mut sender, mut receiver) = socket.split();

    let writer_agent_id = agent_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            let frame = match command.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(agent_id = %writer_agent_id, error = %e, "Failed to encode command");
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(frame.into())).await {
                debug!(agent_id = %writer_agent_id, error = %e, "Failed to write to agent");
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match AgentMessage::from_frame(text.as_str()) {
                Ok(message) => {
                    if controller
                        .agent_message(agent_id.clone(), message)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!(agent_id = %agent_id, connection, error = %e, "Dropping malformed frame");
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(agent_id = %agent_id, connection, "Dropping binary frame");
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                debug!(agent_id = %agent_id, connection, error = %e, "Agent socket error");
                break;
            }
        }
    }

    writer.abort();
    info!(agent_id = %agent_id, connection, "Agent link closed");
    let _ = controller.agent_disconnected(agent_id, connection).await;
}
