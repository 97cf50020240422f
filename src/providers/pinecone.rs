//! Pinecone REST client for the textbook vector index.
//!
//! Only the data-plane calls we need: `query`, `vectors/upsert`,
//! `describe_index_stats`. The index host is taken from PINECONE_INDEX_HOST or
//! resolved once through the control plane at startup.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{IndexRecord, VectorIndex};
use crate::domain::Match;
use crate::error::ProviderError;

const CONTROL_PLANE: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";
pub const DEFAULT_INDEX: &str = "k12-math-textbooks";

#[derive(Clone)]
pub struct Pinecone {
  pub client: reqwest::Client,
  pub api_key: String,
  pub index_name: String,
  /// Data-plane base URL, with scheme.
  pub host: String,
  pub namespace: Option<String>,
}

impl Pinecone {
  /// Build from env when PINECONE_API_KEY is present. Resolves the host if it is not given.
  pub async fn from_env() -> Option<Result<Self, ProviderError>> {
    let api_key = std::env::var("PINECONE_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let index_name = std::env::var("PINECONE_INDEX").unwrap_or_else(|_| DEFAULT_INDEX.into());
    let namespace = std::env::var("PINECONE_NAMESPACE").ok().filter(|n| !n.is_empty());
    let host = std::env::var("PINECONE_INDEX_HOST").ok().filter(|h| !h.is_empty());

    let built = match host {
      Some(h) => Self::new(api_key, index_name, &h, namespace),
      None => Self::resolve(api_key, index_name, CONTROL_PLANE, namespace).await,
    };
    Some(built)
  }

  pub fn new(api_key: String, index_name: String, host: &str, namespace: Option<String>) -> Result<Self, ProviderError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()?;
    Ok(Self { client, api_key, index_name, host: normalize_host(host), namespace })
  }

  /// Look up the index host through the control plane.
  #[instrument(level = "info", skip(api_key, control_plane, namespace), fields(%index_name))]
  pub async fn resolve(
    api_key: String,
    index_name: String,
    control_plane: &str,
    namespace: Option<String>,
  ) -> Result<Self, ProviderError> {
    #[derive(Deserialize)]
    struct Describe { host: String }

    let mut this = Self::new(api_key, index_name, "", namespace)?;
    let url = format!("{}/indexes/{}", control_plane.trim_end_matches('/'), this.index_name);
    let res = this.client.get(&url)
      .header("Api-Key", &this.api_key)
      .header("X-Pinecone-API-Version", API_VERSION)
      .send().await?;
    let d: Describe = read_json(res).await?;
    this.host = normalize_host(&d.host);
    info!(target: "mathsnap_backend", host = %this.host, "Resolved Pinecone index host");
    Ok(this)
  }

  async fn post<B: Serialize, T: for<'a> Deserialize<'a>>(&self, path: &str, body: &B) -> Result<T, ProviderError> {
    let res = self.client.post(format!("{}{}", self.host, path))
      .header("Api-Key", &self.api_key)
      .header("X-Pinecone-API-Version", API_VERSION)
      .json(body)
      .send().await?;
    read_json(res).await
  }
}

fn normalize_host(h: &str) -> String {
  let h = h.trim().trim_end_matches('/');
  if h.is_empty() || h.starts_with("http://") || h.starts_with("https://") {
    h.to_string()
  } else {
    format!("https://{}", h)
  }
}

async fn read_json<T: for<'a> Deserialize<'a>>(res: reqwest::Response) -> Result<T, ProviderError> {
  if !res.status().is_success() {
    let status = res.status().as_u16();
    let message = res.text().await.unwrap_or_default();
    return Err(ProviderError::Api { status, message });
  }
  res.json::<T>().await.map_err(|e| ProviderError::Malformed(e.to_string()))
}

#[async_trait]
impl VectorIndex for Pinecone {
  #[instrument(level = "info", skip(self, vector), fields(index = %self.index_name, dims = vector.len()))]
  async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>, ProviderError> {
    let req = QueryRequest {
      vector,
      top_k,
      include_metadata: true,
      include_values: false,
      namespace: self.namespace.as_deref(),
    };
    let body: QueryResponse = self.post("/query", &req).await?;
    debug!(matches = body.matches.len(), "Pinecone query answered");
    Ok(body.matches)
  }

  #[instrument(level = "info", skip(self, records), fields(index = %self.index_name, n = records.len()))]
  async fn upsert(&self, records: &[IndexRecord]) -> Result<usize, ProviderError> {
    let req = UpsertRequest { vectors: records, namespace: self.namespace.as_deref() };
    let body: UpsertResponse = self.post("/vectors/upsert", &req).await?;
    Ok(body.upserted_count)
  }

  async fn vector_count(&self) -> Result<u64, ProviderError> {
    let body: StatsResponse = self.post("/describe_index_stats", &serde_json::json!({})).await?;
    Ok(body.total_vector_count)
  }
}

// --- DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
  vector: &'a [f32],
  top_k: usize,
  include_metadata: bool,
  include_values: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
  #[serde(default)]
  matches: Vec<Match>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
  vectors: &'a [IndexRecord],
  #[serde(skip_serializing_if = "Option::is_none")]
  namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
  #[serde(default)]
  upserted_count: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
  #[serde(default)]
  total_vector_count: u64,
}
