//! Domain models: queries, retrieved passages, RAG results, and image analysis records.
//!
//! Everything here is ephemeral. Values are built per request and serialized
//! back to the caller in camelCase.

use serde::{Deserialize, Serialize};

/// What kind of help the user is asking for. Drives template and action selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum QueryType {
  HomeworkHelp,
  Definition,
  ConceptExploration,
  /// Generic text question; also what any unrecognized type decodes to.
  #[default]
  Text,
}

impl QueryType {
  pub fn as_str(&self) -> &'static str {
    match self {
      QueryType::HomeworkHelp => "homework_help",
      QueryType::Definition => "definition",
      QueryType::ConceptExploration => "concept_exploration",
      QueryType::Text => "text",
    }
  }
}

impl From<&str> for QueryType {
  fn from(s: &str) -> Self {
    match s.trim() {
      "homework_help" => QueryType::HomeworkHelp,
      "definition" => QueryType::Definition,
      "concept_exploration" => QueryType::ConceptExploration,
      _ => QueryType::Text,
    }
  }
}

impl From<String> for QueryType {
  fn from(s: String) -> Self { QueryType::from(s.as_str()) }
}

impl std::fmt::Display for QueryType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// A user's question, constructed per request and never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
  pub text: String,
  #[serde(default)]
  pub query_type: QueryType,
  #[serde(default)]
  pub grade_level: Option<String>,
}

/// Metadata stored alongside each vector in the index. Every field is optional
/// because the index returns whatever was upserted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassageMetadata {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub book: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub chapter: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub section: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
}

/// Raw similarity match returned by the vector index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Match {
  pub score: f32,
  #[serde(default)]
  pub metadata: PassageMetadata,
}

/// A textbook passage pulled from the index, in retrieval order.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievedPassage {
  pub text: String,
  pub book: String,
  pub chapter: Option<String>,
  pub section: Option<String>,
  pub score: f32,
}

impl RetrievedPassage {
  pub const UNKNOWN_BOOK: &'static str = "Unknown Source";

  pub fn from_match(m: &Match) -> Self {
    Self {
      text: m.metadata.text.clone().unwrap_or_default(),
      book: m.metadata.book.clone().unwrap_or_else(|| Self::UNKNOWN_BOOK.to_string()),
      chapter: non_blank(&m.metadata.chapter),
      section: non_blank(&m.metadata.section),
      score: m.score,
    }
  }
}

/// Ingestion stores an empty section before the first heading; that means "absent".
pub fn non_blank(v: &Option<String>) -> Option<String> {
  v.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

/// Citation shown to the user under an explanation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
  pub book: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub chapter: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub section: Option<String>,
  /// Lossy integer percentage of the match score.
  pub relevance_score: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
  PracticeProblem,
  RelatedConcept,
  VisualAid,
}

/// Follow-up hint offered after an explanation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
  #[serde(rename = "type")]
  pub kind: ActionKind,
  pub title: String,
  pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagResult {
  pub explanation: String,
  pub sources: Vec<Source>,
  pub suggested_actions: Vec<Action>,
  /// 0..=95, zero only when nothing was retrieved.
  pub confidence: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
  Equation,
  WordProblem,
  Graph,
  Geometry,
  #[default]
  Unknown,
}

impl ProblemType {
  /// Lenient decode used on model output; anything unexpected is `Unknown`.
  pub fn parse_lenient(s: &str) -> Self {
    match s.trim().to_ascii_lowercase().as_str() {
      "equation" => ProblemType::Equation,
      "word_problem" => ProblemType::WordProblem,
      "graph" => ProblemType::Graph,
      "geometry" => ProblemType::Geometry,
      _ => ProblemType::Unknown,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Elementary,
  Middle,
  HighSchool,
  #[default]
  Unknown,
}

impl Difficulty {
  pub fn parse_lenient(s: &str) -> Self {
    match s.trim().to_ascii_lowercase().as_str() {
      "elementary" => Difficulty::Elementary,
      "middle" => Difficulty::Middle,
      "high_school" => Difficulty::HighSchool,
      _ => Difficulty::Unknown,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MathProblem {
  pub problem: String,
  #[serde(rename = "type")]
  pub kind: ProblemType,
  pub difficulty: Difficulty,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysisResult {
  pub extracted_text: String,
  pub math_problems: Vec<MathProblem>,
  pub confidence: u8,
  pub suggested_query: String,
}
