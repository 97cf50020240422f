//! Post-generation derivations: confidence, citations, and follow-up actions.
//! All three are pure functions of retrieval output and query type.

use crate::domain::{non_blank, Action, ActionKind, Match, QueryType, RetrievedPassage, Source};
use crate::rag::prompt::relevance_percent;

/// Never claim more than this, whatever the retrieval quality.
pub const CONFIDENCE_CAP: f64 = 95.0;
/// Lowest value for a non-empty retrieval; 0 is reserved for "nothing retrieved".
pub const CONFIDENCE_FLOOR: f64 = 1.0;

/// Mean retrieval score as a rounded percentage in 1..=95; 0 only when nothing was retrieved.
/// Generation quality plays no part in this number.
pub fn estimate_confidence(passages: &[RetrievedPassage]) -> f32 {
  if passages.is_empty() {
    return 0.0;
  }
  let mean = passages.iter().map(|p| p.score as f64).sum::<f64>() / passages.len() as f64;
  (mean * 100.0).round().clamp(CONFIDENCE_FLOOR, CONFIDENCE_CAP) as f32
}

pub fn extract_sources(matches: &[Match]) -> Vec<Source> {
  matches
    .iter()
    .map(|m| Source {
      book: m.metadata.book.clone().unwrap_or_else(|| RetrievedPassage::UNKNOWN_BOOK.to_string()),
      chapter: non_blank(&m.metadata.chapter),
      section: non_blank(&m.metadata.section),
      relevance_score: relevance_percent(m.score),
    })
    .collect()
}

fn action(kind: ActionKind, title: &str, description: &str) -> Action {
  Action { kind, title: title.into(), description: description.into() }
}

pub fn suggested_actions(query_type: QueryType) -> Vec<Action> {
  match query_type {
    QueryType::HomeworkHelp => vec![
      action(ActionKind::PracticeProblem, "Try a Similar Problem", "Practice with a problem that uses the same steps."),
      action(ActionKind::VisualAid, "See It Visually", "Get a diagram or graph that shows how the solution works."),
    ],
    QueryType::Definition => vec![
      action(ActionKind::RelatedConcept, "Explore Related Concepts", "See the ideas this term builds on and leads to."),
      action(ActionKind::PracticeProblem, "Use It in a Problem", "Try a short problem that uses this definition."),
    ],
    QueryType::ConceptExploration => vec![
      action(ActionKind::VisualAid, "Visualize the Concept", "See a picture or graph that makes the idea concrete."),
      action(ActionKind::RelatedConcept, "Go Deeper", "Learn how this concept connects to other topics."),
    ],
    QueryType::Text => Vec::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::PassageMetadata;

  fn passages(scores: &[f32]) -> Vec<RetrievedPassage> {
    scores
      .iter()
      .map(|&score| RetrievedPassage { text: "t".into(), book: "b".into(), chapter: None, section: None, score })
      .collect()
  }

  #[test]
  fn mean_of_three_scores() {
    assert_eq!(estimate_confidence(&passages(&[0.9, 0.8, 0.7])), 80.0);
  }

  #[test]
  fn empty_passages_give_zero() {
    assert_eq!(estimate_confidence(&[]), 0.0);
  }

  #[test]
  fn confidence_is_capped_at_95() {
    assert_eq!(estimate_confidence(&passages(&[0.99, 0.98])), 95.0);
    assert_eq!(estimate_confidence(&passages(&[1.0])), 95.0);
  }

  #[test]
  fn weak_or_negative_retrieval_stays_above_zero() {
    let matches = vec![Match { score: 0.004, metadata: PassageMetadata::default() }];
    let weak: Vec<RetrievedPassage> = matches.iter().map(RetrievedPassage::from_match).collect();
    assert_eq!(extract_sources(&matches).len(), 1);
    assert_eq!(estimate_confidence(&weak), 1.0);
    assert_eq!(estimate_confidence(&passages(&[-0.3, 0.1])), 1.0);
  }

  #[test]
  fn confidence_is_bounded_and_monotone_in_mean() {
    let mut last = -1.0f32;
    for step in 0..=100 {
      let s = step as f32 / 100.0;
      let c = estimate_confidence(&passages(&[s, s, s]));
      assert!((1.0..=95.0).contains(&c), "out of range: {}", c);
      assert!(c >= last, "not monotone at {}: {} < {}", s, c, last);
      last = c;
    }
  }

  #[test]
  fn identical_scores_are_idempotent() {
    let once = estimate_confidence(&passages(&[0.61]));
    let many = estimate_confidence(&passages(&[0.61, 0.61, 0.61, 0.61]));
    assert_eq!(once, many);
  }

  #[test]
  fn sources_keep_order_and_round_scores() {
    let matches = vec![
      Match {
        score: 0.876,
        metadata: PassageMetadata {
          book: Some("Calculus_Volume_1".into()),
          chapter: Some("Chapter 3".into()),
          section: Some("".into()),
          text: Some("derivative".into()),
        },
      },
      Match { score: 0.333, metadata: PassageMetadata::default() },
    ];
    let sources = extract_sources(&matches);
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].book, "Calculus_Volume_1");
    assert_eq!(sources[0].chapter.as_deref(), Some("Chapter 3"));
    assert!(sources[0].section.is_none());
    assert_eq!(sources[0].relevance_score, 88);
    assert_eq!(sources[1].book, "Unknown Source");
    assert_eq!(sources[1].relevance_score, 33);
    assert_eq!(extract_sources(&matches), sources);
  }

  #[test]
  fn two_actions_per_known_type_none_for_text() {
    for qt in [QueryType::HomeworkHelp, QueryType::Definition, QueryType::ConceptExploration] {
      assert_eq!(suggested_actions(qt).len(), 2, "{}", qt);
    }
    assert!(suggested_actions(QueryType::Text).is_empty());
    assert_eq!(suggested_actions(QueryType::HomeworkHelp)[0].kind, ActionKind::PracticeProblem);
  }
}
