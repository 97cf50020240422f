//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::{Caller, BEARER_SUBPROTOCOL};
use crate::error::RagError;
use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>, _caller: Caller) -> impl IntoResponse {
  let session = Uuid::new_v4();
  info!(target: "mathsnap_backend", %session, "WebSocket upgrade requested");
  // Browsers that offered the bearer subprotocol require it echoed back.
  ws.protocols([BEARER_SUBPROTOCOL]).on_upgrade(move |socket| handle_ws(socket, state, session))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, session: Uuid) {
  info!(target: "mathsnap_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "mathsnap_backend", bytes = txt.len(), "WS message received");
            handle_client_ws(incoming, &state).await
          }
          Err(e) => error_message(RagError::MalformedBody(e.to_string())),
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "error": { "status": "INTERNAL", "message": format!("Serialization error: {}", e) } })
            .to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "mathsnap_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => {
        let _ = socket.send(Message::Pong(payload)).await;
      }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "mathsnap_backend", "WebSocket disconnected");
}

fn error_message(e: RagError) -> ServerWsMessage {
  warn!(target: "mathsnap_backend", code = ?e.code(), error = %e, "WS request failed");
  ServerWsMessage::Error { error: e.body() }
}

#[instrument(level = "info", skip_all)]
pub async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::RagQuery { body } => match do_rag_query(state, body).await {
      Ok(result) => ServerWsMessage::RagResult { result },
      Err(e) => error_message(e),
    },

    ClientWsMessage::AnalyzeImage { body } => match do_analyze_image(state, body).await {
      Ok(analysis) => ServerWsMessage::ImageAnalysis { analysis },
      Err(e) => error_message(e),
    },

    ClientWsMessage::ImageQuery { body } => match do_image_query(state, body).await {
      Ok(out) => ServerWsMessage::ImageQueryResult { out },
      Err(e) => error_message(e),
    },
  }
}
