//! WebSocket gateway for reporting agents and live viewers
//!
//! One endpoint serves both roles, decided at the handshake:
//!
//! - a `machine-id` header makes the connection a **reporter**: it registers a
//!   session and its `collect_log` frames feed the dispatcher
//! - no header makes it a **viewer**: it receives `receive_logs` frames, all
//!   machines or only `?machine_id=...`

use std::sync::Arc;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::state::ApiState;
use crate::relay::{ClientFrame, ConnectionHandle, InboundSample, RelayDispatcher};

/// Handshake header identifying a reporting machine
pub const MACHINE_ID_HEADER: &str = "machine-id";

/// Lifecycle of one gateway connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Established,
    Closed,
}

impl ConnectionState {
    fn advance(&mut self, next: ConnectionState, peer: &str) {
        debug!("{peer}: {:?} -> {:?}", self, next);
        *self = next;
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewerParams {
    pub machine_id: Option<String>,
}

/// Role chosen at the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Reporter(String),
    Viewer { filter: Option<String> },
}

impl Role {
    pub fn from_handshake(headers: &HeaderMap, params: ViewerParams) -> Self {
        let reporter = headers
            .get(MACHINE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty());

        match reporter {
            Some(machine_id) => Role::Reporter(machine_id.to_string()),
            None => Role::Viewer {
                filter: params
                    .machine_id
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty()),
            },
        }
    }
}

/// WebSocket upgrade handler
///
/// GET /socket
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<ViewerParams>,
    State(state): State<ApiState>,
) -> Response {
    let role = Role::from_handshake(&headers, params);
    ws.on_upgrade(move |socket| handle_websocket(socket, role, state))
}

async fn handle_websocket(socket: WebSocket, role: Role, state: ApiState) {
    match role {
        Role::Reporter(machine_id) => handle_reporter(socket, machine_id, state.dispatcher).await,
        Role::Viewer { filter } => handle_viewer(socket, filter, state.dispatcher).await,
    }
}

/// Drive a reporter connection until it closes or is superseded
async fn handle_reporter(socket: WebSocket, machine_id: String, dispatcher: Arc<RelayDispatcher>) {
    let mut state = ConnectionState::Connecting;
    let connection = ConnectionHandle::new();
    let connection_id = connection.id();
    let registry = dispatcher.registry().clone();

    if registry
        .register(&machine_id, connection.clone())
        .await
        .is_none()
    {
        warn!("refusing reporter with empty machine id");
        return;
    }

    state.advance(ConnectionState::Established, &machine_id);
    info!("reporter {machine_id} connected (connection {connection_id})");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            _ = connection.closed() => {
                info!("reporter {machine_id} superseded by a newer connection");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }

            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => relay_frame(&dispatcher, &machine_id, &text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("reporter {machine_id} transport error: {e}");
                    break;
                }
            }
        }
    }

    state.advance(ConnectionState::Closed, &machine_id);
    dispatcher.detach(&machine_id, connection_id).await;
    info!("reporter {machine_id} disconnected (connection {connection_id})");
}

/// Decode one reporter frame and hand the sample to the dispatcher
///
/// Bad frames are logged and skipped; the connection stays open.
pub async fn relay_frame(dispatcher: &RelayDispatcher, handshake_id: &str, text: &str) {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("ignoring unparseable frame from {handshake_id}: {e}");
            return;
        }
    };

    let data = match frame {
        ClientFrame::CollectLog(data) => data,
        ClientFrame::Other(event) => {
            debug!("ignoring '{event}' event from {handshake_id}");
            return;
        }
    };

    let sample = match InboundSample::from_value(data) {
        Ok(sample) => sample,
        Err(e) => {
            warn!("rejected sample from {handshake_id}: {e}");
            dispatcher.record_rejected();
            return;
        }
    };

    let machine_id = sample
        .machine_id
        .unwrap_or_else(|| handshake_id.to_string());

    dispatcher
        .on_sample(&machine_id, sample.timestamp, &sample.kind, sample.payload)
        .await;
}

/// Forward window updates to a viewer until either side goes away
async fn handle_viewer(socket: WebSocket, filter: Option<String>, dispatcher: Arc<RelayDispatcher>) {
    let peer = match &filter {
        Some(machine_id) => format!("viewer[{machine_id}]"),
        None => "viewer".to_string(),
    };
    let mut state = ConnectionState::Connecting;

    let (mut sender, mut receiver) = socket.split();
    let mut updates = dispatcher.subscribe();

    state.advance(ConnectionState::Established, &peer);
    info!("{peer} connected");

    let send_peer = peer.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    if filter.as_deref().is_some_and(|id| id != update.machine_id) {
                        continue;
                    }

                    let text = match update.to_frame() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode window update: {e}");
                            continue;
                        }
                    };

                    if sender.send(Message::Text(text)).await.is_err() {
                        debug!("{send_peer}: send failed, client disconnected");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("{send_peer} lagging, skipped {skipped} window updates");
                }
                Err(RecvError::Closed) => {
                    debug!("broadcast channel closed");
                    break;
                }
            }
        }
    });

    let recv_peer = peer.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Text(_) => debug!("{recv_peer}: ignoring frame from viewer"),
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    state.advance(ConnectionState::Closed, &peer);
    info!("{peer} disconnected");
}
