//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::domain::{ImageAnalysisResult, QueryType, RagResult};
use crate::error::ErrorBody;

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagQueryIn {
  #[serde(default)]
  pub query: Option<String>,
  #[serde(default)]
  pub query_type: Option<String>,
  #[serde(default)]
  pub grade_level: Option<String>,
}

/// Image input: either a URL or inline base64 with its MIME type.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIn {
  #[serde(default)]
  pub image_url: Option<String>,
  #[serde(default)]
  pub image_base64: Option<String>,
  #[serde(default)]
  pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalyzeIn {
  #[serde(flatten)]
  pub image: ImageIn,
  #[serde(default)]
  pub grade_level: Option<String>,
  #[serde(default)]
  pub analysis_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageQueryIn {
  #[serde(flatten)]
  pub image: ImageIn,
  /// Optional question from the student about the image.
  #[serde(default)]
  pub question: Option<String>,
  #[serde(default)]
  pub grade_level: Option<String>,
  #[serde(default)]
  pub analysis_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageQueryOut {
  pub analysis: ImageAnalysisResult,
  pub query_type: QueryType,
  pub query: String,
  pub result: RagResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOut {
  pub ok: bool,
  pub rag_enabled: bool,
  pub image_enabled: bool,
}

//
// WebSocket
//

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
  Ping,
  RagQuery {
    #[serde(flatten)]
    body: RagQueryIn,
  },
  AnalyzeImage {
    #[serde(flatten)]
    body: ImageAnalyzeIn,
  },
  ImageQuery {
    #[serde(flatten)]
    body: ImageQueryIn,
  },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
  Pong,
  RagResult {
    result: RagResult,
  },
  ImageAnalysis {
    analysis: ImageAnalysisResult,
  },
  ImageQueryResult {
    #[serde(flatten)]
    out: ImageQueryOut,
  },
  Error {
    error: ErrorBody,
  },
}
