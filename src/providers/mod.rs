//! Collaborator contracts consumed by the pipeline, plus their HTTP implementations.
//!
//! The pipeline only ever sees these traits. Production wiring uses
//! `openai::OpenAI` for embeddings and completions and `pinecone::Pinecone`
//! for the vector index; tests plug in the fakes at the bottom of this file.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::Match;
use crate::error::ProviderError;

pub mod openai;
pub mod pinecone;

#[async_trait]
pub trait Embedder: Send + Sync {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// A record written to the index by the ingestion job.
#[derive(Clone, Debug, Serialize)]
pub struct IndexRecord {
  pub id: String,
  pub values: Vec<f32>,
  pub metadata: IndexRecordMetadata,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecordMetadata {
  pub book: String,
  pub chapter: String,
  pub section: String,
  pub chunk_id: usize,
  pub text: String,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
  /// Top-K matches for `vector`. An empty list is a valid answer.
  async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>, ProviderError>;

  async fn upsert(&self, records: &[IndexRecord]) -> Result<usize, ProviderError>;

  async fn vector_count(&self) -> Result<u64, ProviderError>;
}

#[async_trait]
pub trait Completion: Send + Sync {
  /// Text completion. Empty content is an error, never an empty string.
  async fn complete(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
    max_tokens: u32,
  ) -> Result<String, ProviderError>;

  /// Vision completion over a single image (URL or data URL).
  async fn complete_with_image(
    &self,
    prompt: &str,
    image_url: &str,
    detail: &str,
    max_tokens: u32,
  ) -> Result<String, ProviderError>;
}
