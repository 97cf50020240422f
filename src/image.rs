//! Image analysis: one vision completion, then a best-effort structured decode.
//!
//! The model is asked for JSON but often wraps it in prose or code fences, or
//! drops fields. Decoding therefore has two tiers:
//!   1. find the first `{...}` block, parse it, and coerce each field with defaults;
//!   2. if that fails entirely, keep the raw text and synthesize one unknown problem.
//! Either way the caller gets a usable `ImageAnalysisResult`.
//!
//! This module also holds the image -> query conversion and the keyword
//! cascade that picks a query type from an analysis.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::{Prompts, RagSettings};
use crate::domain::{Difficulty, ImageAnalysisResult, MathProblem, ProblemType, QueryType};
use crate::error::RagError;
use crate::providers::Completion;
use crate::util::{contains_any_ci, fill_template, trunc_for_log};

pub const EXTRACTED_TEXT_PLACEHOLDER: &str = "Unable to extract text from image";
pub const SUGGESTED_QUERY_FALLBACK: &str = "Help me understand this math problem";
pub const EMPTY_QUERY_PLACEHOLDER: &str = "Please help me with the math problem in this image";
pub const DEFAULT_CONFIDENCE: u8 = 50;
pub const DEGRADED_CONFIDENCE: u8 = 30;

/// Why the structured tier gave up. Never leaves this module as an error.
#[derive(Debug, Error)]
pub enum DegradedParse {
  #[error("no JSON object found in model output")]
  NoJsonBlock,
  #[error("JSON block did not parse: {0}")]
  InvalidJson(#[from] serde_json::Error),
  #[error("JSON block is not an object")]
  NotAnObject,
}

fn json_block_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex"))
}

/// Tier 1: locate and coerce. Missing or malformed fields fall back to defaults.
pub fn decode_structured(raw: &str) -> Result<ImageAnalysisResult, DegradedParse> {
  let block = json_block_re().find(raw).ok_or(DegradedParse::NoJsonBlock)?;
  let value: Value = serde_json::from_str(block.as_str())?;
  let obj = value.as_object().ok_or(DegradedParse::NotAnObject)?;

  let extracted_text = obj
    .get("extractedText")
    .and_then(Value::as_str)
    .map(str::to_string)
    .unwrap_or_else(|| EXTRACTED_TEXT_PLACEHOLDER.to_string());

  let math_problems = obj
    .get("mathProblems")
    .and_then(Value::as_array)
    .map(|items| items.iter().filter_map(coerce_problem).collect())
    .unwrap_or_default();

  let confidence = obj
    .get("confidence")
    .and_then(Value::as_f64)
    .map(|c| c.round().clamp(0.0, 100.0) as u8)
    .unwrap_or(DEFAULT_CONFIDENCE);

  let suggested_query = obj
    .get("suggestedQuery")
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .unwrap_or(SUGGESTED_QUERY_FALLBACK)
    .to_string();

  Ok(ImageAnalysisResult { extracted_text, math_problems, confidence, suggested_query })
}

fn coerce_problem(item: &Value) -> Option<MathProblem> {
  match item {
    Value::String(s) => Some(MathProblem { problem: s.clone(), kind: ProblemType::Unknown, difficulty: Difficulty::Unknown }),
    Value::Object(o) => Some(MathProblem {
      problem: o.get("problem").and_then(Value::as_str).unwrap_or_default().to_string(),
      kind: o.get("type").and_then(Value::as_str).map(ProblemType::parse_lenient).unwrap_or_default(),
      difficulty: o.get("difficulty").and_then(Value::as_str).map(Difficulty::parse_lenient).unwrap_or_default(),
    }),
    _ => None,
  }
}

/// Tier 2: the raw response is all we have.
pub fn degraded_result(raw: &str) -> ImageAnalysisResult {
  let text = raw.trim().to_string();
  ImageAnalysisResult {
    extracted_text: text.clone(),
    math_problems: vec![MathProblem { problem: text, kind: ProblemType::Unknown, difficulty: Difficulty::Unknown }],
    confidence: DEGRADED_CONFIDENCE,
    suggested_query: SUGGESTED_QUERY_FALLBACK.to_string(),
  }
}

/// Always yields a result; a degraded decode is logged, not returned as an error.
pub fn parse_analysis_response(raw: &str) -> ImageAnalysisResult {
  match decode_structured(raw) {
    Ok(r) => r,
    Err(reason) => {
      warn!(target: "image", %reason, raw = %trunc_for_log(raw, 120), "Falling back to degraded image analysis");
      degraded_result(raw)
    }
  }
}

/// Where the image comes from. Inline images are sent as a data URL.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageRef {
  Url(String),
  Inline { mime: String, base64: String },
}

impl ImageRef {
  pub fn to_url(&self) -> String {
    match self {
      ImageRef::Url(u) => u.clone(),
      ImageRef::Inline { mime, base64 } => format!("data:{};base64,{}", mime, base64),
    }
  }
}

pub struct ImageAnalyzer {
  completion: Arc<dyn Completion>,
  prompts: Prompts,
  settings: RagSettings,
}

impl ImageAnalyzer {
  pub fn new(completion: Arc<dyn Completion>, prompts: Prompts, settings: RagSettings) -> Self {
    Self { completion, prompts, settings }
  }

  pub fn prompt_for(&self, grade_level: Option<&str>, analysis_type: Option<&str>) -> String {
    let grade = grade_level.map(str::trim).filter(|g| !g.is_empty()).unwrap_or(self.settings.default_grade_level.as_str());
    let focus = analysis_type.map(str::trim).filter(|a| !a.is_empty()).unwrap_or("general");
    fill_template(&self.prompts.image_analysis, &[("grade_level", grade), ("analysis_type", focus)])
  }

  #[instrument(target = "image", level = "info", skip(self, image, grade_level, analysis_type), fields(inline = matches!(image, ImageRef::Inline { .. }), ?grade_level, ?analysis_type))]
  pub async fn analyze(
    &self,
    image: &ImageRef,
    grade_level: Option<&str>,
    analysis_type: Option<&str>,
  ) -> Result<ImageAnalysisResult, RagError> {
    let prompt = self.prompt_for(grade_level, analysis_type);
    let raw = self
      .completion
      .complete_with_image(&prompt, &image.to_url(), &self.settings.image_detail, self.settings.image_max_tokens)
      .await
      .map_err(RagError::ImageAnalysis)?;

    let result = parse_analysis_response(&raw);
    info!(target: "image", problems = result.math_problems.len(), confidence = result.confidence, "Image analyzed");
    Ok(result)
  }
}

/// Question text to run through the RAG pipeline for an analyzed image.
pub fn convert_image_analysis_to_query(analysis: &ImageAnalysisResult, user_question: Option<&str>) -> String {
  let extracted = analysis.extracted_text.trim();
  if let Some(q) = user_question.map(str::trim).filter(|q| !q.is_empty()) {
    return join_with_extracted(q, extracted);
  }
  let suggested = analysis.suggested_query.trim();
  if !suggested.is_empty() {
    return join_with_extracted(suggested, extracted);
  }
  if !extracted.is_empty() {
    return extracted.to_string();
  }
  EMPTY_QUERY_PLACEHOLDER.to_string()
}

fn join_with_extracted(lead: &str, extracted: &str) -> String {
  if extracted.is_empty() {
    lead.to_string()
  } else {
    format!("{}\n\nFrom the image: {}", lead, extracted)
  }
}

/// Fixed keyword cascade. Branch order matters and is part of the contract.
pub fn determine_query_type_from_image(analysis: &ImageAnalysisResult) -> QueryType {
  if analysis.math_problems.is_empty() {
    return QueryType::Text;
  }
  if analysis.math_problems.len() > 1
    || analysis.math_problems.iter().any(|p| p.kind == ProblemType::WordProblem)
    || contains_any_ci(&analysis.extracted_text, &["homework", "worksheet", "problem"])
  {
    return QueryType::HomeworkHelp;
  }
  if contains_any_ci(&analysis.suggested_query, &["what is", "define", "meaning"]) {
    return QueryType::Definition;
  }
  if contains_any_ci(&analysis.suggested_query, &["how", "why", "explain"]) {
    return QueryType::ConceptExploration;
  }
  QueryType::HomeworkHelp
}
