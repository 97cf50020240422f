//! The RAG query pipeline: embed -> retrieve -> compose -> generate -> score.
//!
//! `RagPipeline` owns its collaborators as injected trait objects and holds no
//! mutable state, so one instance serves every request concurrently. Each stage
//! runs in order and any upstream failure ends the request; the only branch is
//! the no-context fallback when retrieval comes back empty.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::config::{Prompts, RagSettings};
use crate::domain::{Query, RagResult, RetrievedPassage};
use crate::error::RagError;
use crate::providers::{Completion, Embedder, VectorIndex};

pub mod prompt;
pub mod scoring;

use prompt::compose_prompt;
use scoring::{estimate_confidence, extract_sources, suggested_actions};

/// Returned verbatim when the index has nothing for the question.
pub const NO_CONTEXT_EXPLANATION: &str = "I couldn't find information about this topic in the math textbooks. Try rephrasing your question or asking about a more specific math concept.";

pub struct RagPipeline {
  embedder: Arc<dyn Embedder>,
  index: Arc<dyn VectorIndex>,
  completion: Arc<dyn Completion>,
  prompts: Prompts,
  settings: RagSettings,
}

impl RagPipeline {
  pub fn new(
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    completion: Arc<dyn Completion>,
    prompts: Prompts,
    settings: RagSettings,
  ) -> Self {
    Self { embedder, index, completion, prompts, settings }
  }

  #[instrument(
    target = "rag",
    level = "info",
    skip(self, query),
    fields(query_type = %query.query_type, grade = ?query.grade_level, text_len = query.text.len())
  )]
  pub async fn answer(&self, query: &Query) -> Result<RagResult, RagError> {
    let text = query.text.trim();
    if text.is_empty() {
      return Err(RagError::InvalidInput("query must be a non-empty string".into()));
    }
    let start = Instant::now();

    let vector = self.embedder.embed(text).await.map_err(RagError::Embedding)?;

    let matches = self
      .index
      .query(&vector, self.settings.top_k)
      .await
      .map_err(RagError::Retrieval)?;

    if matches.is_empty() {
      warn!(target: "rag", elapsed = ?start.elapsed(), "No passages retrieved; answering with no-context fallback");
      return Ok(no_context_result());
    }

    let passages: Vec<RetrievedPassage> = matches.iter().map(RetrievedPassage::from_match).collect();
    let grade_level = query
      .grade_level
      .as_deref()
      .map(str::trim)
      .filter(|g| !g.is_empty())
      .unwrap_or(self.settings.default_grade_level.as_str());
    let system = compose_prompt(&self.prompts, text, &passages, query.query_type, grade_level);

    let explanation = self
      .completion
      .complete(&system, text, self.settings.temperature, self.settings.max_tokens)
      .await
      .map_err(RagError::Generation)?;

    let result = RagResult {
      explanation,
      sources: extract_sources(&matches),
      suggested_actions: suggested_actions(query.query_type),
      confidence: estimate_confidence(&passages),
    };
    info!(
      target: "rag",
      passages = passages.len(),
      confidence = result.confidence,
      explanation_len = result.explanation.len(),
      elapsed = ?start.elapsed(),
      "RAG answer generated"
    );
    Ok(result)
  }
}

pub fn no_context_result() -> RagResult {
  RagResult {
    explanation: NO_CONTEXT_EXPLANATION.to_string(),
    sources: Vec::new(),
    suggested_actions: Vec::new(),
    confidence: 0.0,
  }
}
