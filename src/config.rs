//! Loading tutor configuration (prompts + pipeline settings) from TOML.
//!
//! See `AgentConfig`, `Prompts` and `RagSettings` for the expected schema.
//! Every table and field is optional; missing pieces use the defaults below.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub rag: RagSettings,
}

/// Prompt texts used by the composer and the image adapter.
/// Templates accept `{grade_level}`; the image prompt also accepts `{analysis_type}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub homework_help_system: String,
  pub definition_system: String,
  pub concept_exploration_system: String,
  pub text_system: String,
  pub guidelines: String,
  pub image_analysis: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      homework_help_system: "You are MathSnap, a patient math tutor helping a {grade_level} student with homework. Help the student understand how to approach the problem step by step. Do not simply hand over the final answer; guide the student so they can reach it themselves.".into(),
      definition_system: "You are MathSnap, a math tutor explaining vocabulary to a {grade_level} student. Give a clear, precise definition, then a simple example that shows the term in use.".into(),
      concept_exploration_system: "You are MathSnap, a math tutor helping a {grade_level} student explore a concept in depth. Explain why the idea works, how it connects to things the student already knows, and where it shows up in real life.".into(),
      text_system: "You are MathSnap, a friendly math tutor for a {grade_level} student. Answer the question clearly and at a level the student can follow.".into(),
      guidelines: concat!(
        "Guidelines:\n",
        "- Base your explanation on the textbook passages above and cite them by book and chapter.\n",
        "- If the passages do not fully cover the question, say so instead of guessing.\n",
        "- Be encouraging and supportive.\n",
        "- For homework help, guide the student through the reasoning rather than giving the answer directly.\n",
        "- Use simple language and short steps; show any math in plain text."
      ).into(),
      image_analysis: concat!(
        "You are analyzing a photo of math material for a {grade_level} student. Analysis focus: {analysis_type}.\n",
        "Extract all readable text and identify each math problem in the image.\n",
        "Respond ONLY with JSON of this exact shape:\n",
        "{\"extractedText\": string, ",
        "\"mathProblems\": [{\"problem\": string, \"type\": \"equation\"|\"word_problem\"|\"graph\"|\"geometry\"|\"unknown\", ",
        "\"difficulty\": \"elementary\"|\"middle\"|\"high_school\"|\"unknown\"}], ",
        "\"confidence\": number from 0 to 100, ",
        "\"suggestedQuery\": string (a question the student could ask about this image)}"
      ).into(),
    }
  }
}

/// Knobs for the pipeline stages. Defaults match the production behavior.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RagSettings {
  pub top_k: usize,
  pub temperature: f32,
  pub max_tokens: u32,
  pub default_grade_level: String,
  pub image_detail: String,
  pub image_max_tokens: u32,
  /// Request body cap for the image endpoints; inline photos travel as base64.
  pub max_image_body_bytes: usize,
}

/// Default image request cap: the vision API's 20 MB image limit plus base64 overhead.
pub const DEFAULT_MAX_IMAGE_BODY_BYTES: usize = 28 * 1024 * 1024;

impl Default for RagSettings {
  fn default() -> Self {
    Self {
      top_k: 5,
      temperature: 0.7,
      max_tokens: 1000,
      default_grade_level: "middle school".into(),
      image_detail: "high".into(),
      image_max_tokens: 1000,
      max_image_body_bytes: DEFAULT_MAX_IMAGE_BODY_BYTES,
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "mathsnap_backend", %path, top_k = cfg.rag.top_k, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "mathsnap_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "mathsnap_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}
