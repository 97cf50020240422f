//! MathSnap · K-12 Math Tutor Backend
//!
//! - Axum HTTP + WebSocket API for textbook-grounded explanations (RAG)
//! - Photo-of-homework analysis feeding the same pipeline
//! - `ingest <dir>` batch job that fills the vector index from textbook text
//!
//! Important env variables:
//!   PORT                   : u16 (default 3000)
//!   OPENAI_API_KEY         : enables embeddings, completions and vision
//!   OPENAI_BASE_URL        : default "https://api.openai.com/v1"
//!   OPENAI_CHAT_MODEL      : default "gpt-4o-mini"
//!   OPENAI_VISION_MODEL    : default "gpt-4o"
//!   OPENAI_EMBEDDING_MODEL : default "text-embedding-3-small"
//!   PINECONE_API_KEY       : enables the vector index
//!   PINECONE_INDEX         : default "k12-math-textbooks"
//!   PINECONE_INDEX_HOST    : data-plane host; looked up when absent
//!   PINECONE_NAMESPACE     : optional namespace
//!   MATHSNAP_API_TOKENS    : comma-separated bearer tokens; any token when unset
//!   AGENT_CONFIG_PATH      : path to TOML config (prompts + pipeline settings)
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

mod auth;
mod config;
mod domain;
mod error;
mod image;
mod ingest;
mod logic;
mod protocol;
mod providers;
mod rag;
mod routes;
mod state;
mod telemetry;
mod util;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info, instrument};

use crate::ingest::Ingestor;
use crate::providers::{openai::OpenAI, pinecone::Pinecone};
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let args: Vec<String> = std::env::args().skip(1).collect();
  match args.first().map(String::as_str) {
    Some("ingest") => {
      let dir = args.get(1).map(PathBuf::from).ok_or("usage: mathsnap-backend ingest <dir>")?;
      run_ingest(dir).await
    }
    Some(other) => Err(format!("unknown command: {}", other).into()),
    None => serve().await,
  }
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
  let state = Arc::new(AppState::from_env().await);
  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "mathsnap_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(target: "mathsnap_backend", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "mathsnap_backend", "Shutdown signal received");
}

async fn run_ingest(dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
  let openai = OpenAI::from_env().ok_or("OPENAI_API_KEY is required for ingestion")?;
  let pinecone = Pinecone::from_env().await.ok_or("PINECONE_API_KEY is required for ingestion")??;

  info!(target: "ingest", dir = %dir.display(), index = %pinecone.index_name, model = %openai.embedding_model, "Starting ingestion");
  let reports = Ingestor::new(&openai, &pinecone).ingest_dir(&dir).await?;
  if reports.is_empty() {
    error!(target: "ingest", dir = %dir.display(), "No books were ingested");
  }
  for r in &reports {
    info!(target: "ingest", book = %r.book, chunks = r.chunks, upserted = r.upserted, skipped = r.skipped, "Book summary");
  }
  let total: usize = reports.iter().map(|r| r.upserted).sum();
  info!(target: "ingest", books = reports.len(), vectors = total, "Ingestion finished");
  Ok(())
}
