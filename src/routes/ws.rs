//! WebSocket upgrade + message loop. Each client frame is parsed as a host intent
//! and forwarded to the stage. Every state change is pushed back as a snapshot,
//! and audio cues are relayed as they happen.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, error, instrument, debug, warn};

use crate::protocol::{HostIntent, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "faceoff_stage", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  match socket.send(Message::Text(out)).await {
    Ok(()) => true,
    Err(e) => {
      error!(target: "faceoff_stage", error = %e, "WS send error");
      false
    }
  }
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "faceoff_stage", "WebSocket connected");
  let mut snapshots = state.stage.subscribe_snapshots();
  let mut cues = state.stage.subscribe_cues();

  let first = ServerWsMessage::Snapshot { state: Box::new(snapshots.borrow_and_update().clone()) };
  if !send(&mut socket, &first).await {
    return;
  }

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            let reply = match serde_json::from_str::<HostIntent>(&txt) {
              Ok(intent) => {
                debug!(target: "faceoff_stage", "WS received: {:?}", &intent);
                let is_ping = matches!(intent, HostIntent::Ping);
                match intent.into_command() {
                  // The resulting snapshot arrives through the watch channel.
                  Some(cmd) => state.stage.request(cmd).await.is_none().then(|| ServerWsMessage::Error {
                    message: "Stage is not running".into(),
                  }),
                  None if is_ping => Some(ServerWsMessage::Pong),
                  // Ignored intent: nothing changed, nothing to push.
                  None => None,
                }
              }
              Err(e) => Some(ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }),
            };
            if let Some(reply) = reply {
              if !send(&mut socket, &reply).await { break; }
            }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
      changed = snapshots.changed() => {
        if changed.is_err() { break; }
        let snap = snapshots.borrow_and_update().clone();
        if !send(&mut socket, &ServerWsMessage::Snapshot { state: Box::new(snap) }).await { break; }
      }
      cue = cues.recv() => match cue {
        Ok(cue) => {
          if !send(&mut socket, &ServerWsMessage::Cue { cue }).await { break; }
        }
        Err(RecvError::Lagged(skipped)) => warn!(target: "faceoff_stage", skipped, "WS client lagging on cues"),
        Err(RecvError::Closed) => break,
      },
    }
  }
  info!(target: "faceoff_stage", "WebSocket disconnected");
}
