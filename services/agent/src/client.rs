//! WebSocket link to the controller.

use anyhow::{Context, Result};
use fleet_id::AgentId;
use fleet_proto::AGENT_ID_HEADER;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

pub type ControllerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the agent link, identifying as `agent_id`.
pub async fn connect(url: &str, agent_id: &AgentId) -> Result<ControllerSocket> {
    let mut request = url
        .into_client_request()
        .with_context(|| format!("invalid controller URL {url}"))?;
    request.headers_mut().insert(
        HeaderName::from_bytes(AGENT_ID_HEADER.as_bytes())?,
        HeaderValue::from_str(agent_id.as_str())?,
    );

    let (socket, response) = tokio_tungstenite::connect_async(request)
        .await
        .with_context(|| format!("failed to connect to controller at {url}"))?;
    debug!(status = %response.status(), "Controller accepted agent link");

    Ok(socket)
}
