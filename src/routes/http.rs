//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Failures render through `RagError`'s `IntoResponse`.

use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::{info, instrument};

use crate::auth::Caller;
use crate::domain::{ImageAnalysisResult, RagResult};
use crate::error::RagError;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

use super::ApiJson;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthOut> {
  Json(HealthOut { ok: true, rag_enabled: state.pipeline.is_some(), image_enabled: state.analyzer.is_some() })
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_rag_query(
  State(state): State<Arc<AppState>>,
  _caller: Caller,
  ApiJson(body): ApiJson<RagQueryIn>,
) -> Result<Json<RagResult>, RagError> {
  let result = do_rag_query(&state, body).await?;
  info!(target: "mathsnap_backend", sources = result.sources.len(), confidence = result.confidence, "HTTP rag_query served");
  Ok(Json(result))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_analyze_image(
  State(state): State<Arc<AppState>>,
  _caller: Caller,
  ApiJson(body): ApiJson<ImageAnalyzeIn>,
) -> Result<Json<ImageAnalysisResult>, RagError> {
  let analysis = do_analyze_image(&state, body).await?;
  info!(target: "mathsnap_backend", problems = analysis.math_problems.len(), "HTTP analyze_image served");
  Ok(Json(analysis))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_image_query(
  State(state): State<Arc<AppState>>,
  _caller: Caller,
  ApiJson(body): ApiJson<ImageQueryIn>,
) -> Result<Json<ImageQueryOut>, RagError> {
  let out = do_image_query(&state, body).await?;
  info!(target: "mathsnap_backend", query_type = %out.query_type, confidence = out.result.confidence, "HTTP image_query served");
  Ok(Json(out))
}
