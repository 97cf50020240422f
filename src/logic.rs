//! Core operations shared by both HTTP and WebSocket handlers.
//!
//! Each operation validates its input, checks that the services it needs are
//! configured, and delegates to the pipeline or the image analyzer.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{info, instrument};

use crate::domain::{ImageAnalysisResult, Query, QueryType, RagResult};
use crate::error::RagError;
use crate::image::{
  convert_image_analysis_to_query, determine_query_type_from_image, ImageRef, EXTRACTED_TEXT_PLACEHOLDER,
};
use crate::protocol::{ImageAnalyzeIn, ImageIn, ImageQueryIn, ImageQueryOut, RagQueryIn};
use crate::state::AppState;

const DEFAULT_MIME: &str = "image/jpeg";

fn non_empty(v: &Option<String>) -> Option<&str> {
  v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Validate the image part of a request. Inline data must be real base64.
pub fn resolve_image(input: &ImageIn) -> Result<ImageRef, RagError> {
  if let Some(url) = non_empty(&input.image_url) {
    return Ok(ImageRef::Url(url.to_string()));
  }
  let Some(data) = non_empty(&input.image_base64) else {
    return Err(RagError::InvalidInput("imageUrl or imageBase64 is required".into()));
  };
  // Accept a full data URL as well as bare base64.
  let (mime_from_url, data) = match data.strip_prefix("data:").and_then(|rest| rest.split_once(";base64,")) {
    Some((mime, payload)) => (Some(mime), payload),
    None => (None, data),
  };
  let mime = non_empty(&input.mime_type).or(mime_from_url).unwrap_or(DEFAULT_MIME);
  if !mime.starts_with("image/") {
    return Err(RagError::InvalidInput(format!("unsupported mimeType: {}", mime)));
  }
  if STANDARD.decode(data).is_err() {
    return Err(RagError::InvalidInput("imageBase64 is not valid base64".into()));
  }
  Ok(ImageRef::Inline { mime: mime.to_string(), base64: data.to_string() })
}

#[instrument(level = "info", skip(state, body), fields(query_type = ?body.query_type))]
pub async fn do_rag_query(state: &AppState, body: RagQueryIn) -> Result<RagResult, RagError> {
  let Some(text) = non_empty(&body.query) else {
    return Err(RagError::InvalidInput("query must be a non-empty string".into()));
  };
  let pipeline = state.pipeline.as_ref().ok_or(RagError::NotConfigured("knowledge base"))?;
  let query = Query {
    text: text.to_string(),
    query_type: body.query_type.as_deref().map(QueryType::from).unwrap_or_default(),
    grade_level: body.grade_level.clone(),
  };
  pipeline.answer(&query).await
}

#[instrument(level = "info", skip(state, body))]
pub async fn do_analyze_image(state: &AppState, body: ImageAnalyzeIn) -> Result<ImageAnalysisResult, RagError> {
  let image = resolve_image(&body.image)?;
  let analyzer = state.analyzer.as_ref().ok_or(RagError::NotConfigured("image analysis"))?;
  analyzer
    .analyze(&image, body.grade_level.as_deref(), body.analysis_type.as_deref())
    .await
}

/// Analyze the image, turn it into a question, classify it, and answer it.
#[instrument(level = "info", skip(state, body), fields(has_question = non_empty(&body.question).is_some()))]
pub async fn do_image_query(state: &AppState, body: ImageQueryIn) -> Result<ImageQueryOut, RagError> {
  let image = resolve_image(&body.image)?;
  let analyzer = state.analyzer.as_ref().ok_or(RagError::NotConfigured("image analysis"))?;
  let pipeline = state.pipeline.as_ref().ok_or(RagError::NotConfigured("knowledge base"))?;

  let analysis = analyzer
    .analyze(&image, body.grade_level.as_deref(), body.analysis_type.as_deref())
    .await?;

  let question = non_empty(&body.question);
  let extracted = analysis.extracted_text.trim();
  if question.is_none() && (extracted.is_empty() || extracted == EXTRACTED_TEXT_PLACEHOLDER) {
    return Err(RagError::NoExtractableText("no text could be extracted from the image; add a question".into()));
  }

  let query_text = convert_image_analysis_to_query(&analysis, question);
  let query_type = determine_query_type_from_image(&analysis);
  info!(target: "image", %query_type, query_len = query_text.len(), "Image converted to query");

  let query = Query { text: query_text.clone(), query_type, grade_level: body.grade_level.clone() };
  let result = pipeline.answer(&query).await?;
  Ok(ImageQueryOut { analysis, query_type, query: query_text, result })
}
