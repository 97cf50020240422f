//! Prompt composition: template choice by query type, context block, guidelines.
//!
//! Composition is a pure function of its inputs. Passage text is copied into
//! the context block verbatim.

use crate::config::Prompts;
use crate::domain::{QueryType, RetrievedPassage};
use crate::util::fill_template;

pub const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";
pub const CONTENT_MARKER: &str = "Content:\n";

pub fn system_template(prompts: &Prompts, query_type: QueryType) -> &str {
  match query_type {
    QueryType::HomeworkHelp => &prompts.homework_help_system,
    QueryType::Definition => &prompts.definition_system,
    QueryType::ConceptExploration => &prompts.concept_exploration_system,
    QueryType::Text => &prompts.text_system,
  }
}

/// Percentage shown to the model and to the user for a raw match score.
pub fn relevance_percent(score: f32) -> u8 {
  (score * 100.0).round().clamp(0.0, 100.0) as u8
}

/// One numbered block per passage, in retrieval order.
pub fn build_context(passages: &[RetrievedPassage]) -> String {
  passages
    .iter()
    .enumerate()
    .map(|(i, p)| {
      let mut block = format!("[Source {}] (Relevance: {}%)\nBook: {}\n", i + 1, relevance_percent(p.score), p.book);
      if let Some(ch) = &p.chapter {
        block.push_str(&format!("Chapter: {}\n", ch));
      }
      if let Some(sec) = &p.section {
        block.push_str(&format!("Section: {}\n", sec));
      }
      block.push_str(CONTENT_MARKER);
      block.push_str(&p.text);
      block
    })
    .collect::<Vec<_>>()
    .join(PASSAGE_SEPARATOR)
}

/// Full system prompt for the explanation call.
pub fn compose_prompt(
  prompts: &Prompts,
  query: &str,
  passages: &[RetrievedPassage],
  query_type: QueryType,
  grade_level: &str,
) -> String {
  let system = fill_template(system_template(prompts, query_type), &[("grade_level", grade_level)]);
  format!(
    "{}\n\nStudent question: {}\n\nRelevant textbook content:\n\n{}\n\n{}",
    system,
    query.trim(),
    build_context(passages),
    prompts.guidelines
  )
}
