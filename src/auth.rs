//! Bearer-token extractor for the authenticated endpoints.
//!
//! The token comes from `Authorization: Bearer <token>`. Browser WebSocket
//! clients cannot set that header, so the upgrade request may instead offer
//! the subprotocols `bearer, <token>` (`new WebSocket(url, ["bearer", token])`).

use std::sync::Arc;

use axum::{
  async_trait,
  extract::FromRequestParts,
  http::{
    header::{HeaderName, AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL},
    request::Parts,
  },
};
use tracing::debug;

use crate::error::RagError;
use crate::state::AppState;

/// Subprotocol name that marks the next offered subprotocol as a bearer token.
pub const BEARER_SUBPROTOCOL: &str = "bearer";

/// An authenticated caller. Handlers that take this reject anonymous requests.
#[derive(Debug)]
pub struct Caller;

/// Token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(value: &str) -> Option<&str> {
  let (scheme, token) = value.trim().split_once(' ')?;
  if !scheme.eq_ignore_ascii_case("bearer") {
    return None;
  }
  let token = token.trim();
  (!token.is_empty()).then_some(token)
}

/// Token from a `Sec-WebSocket-Protocol: bearer, <token>` header value.
pub fn subprotocol_token(value: &str) -> Option<&str> {
  let mut offered = value.split(',').map(str::trim);
  offered.find(|p| p.eq_ignore_ascii_case(BEARER_SUBPROTOCOL))?;
  offered.next().filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
  type Rejection = RagError;

  async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
    let headers = &parts.headers;
    let header = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok());
    let token = header(AUTHORIZATION)
      .and_then(bearer_token)
      .or_else(|| header(SEC_WEBSOCKET_PROTOCOL).and_then(subprotocol_token));
    match token {
      Some(t) if state.auth.accepts(t) => Ok(Caller),
      _ => {
        debug!(target: "mathsnap_backend", has_header = headers.contains_key(AUTHORIZATION), "Rejected unauthenticated request");
        Err(RagError::Unauthenticated)
      }
    }
  }
}
