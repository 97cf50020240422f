//! Error taxonomy for the tutoring pipeline and its mapping onto transport codes.
//!
//! `ProviderError` is what an external collaborator (embeddings, vector index,
//! completions) reports. `RagError` is what a request fails with; its variant
//! alone decides the status code, the user-facing message, and the diagnostic
//! detail attached to the response.

use axum::{
  extract::rejection::JsonRejection,
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("HTTP request error: {0}")]
  Http(#[from] reqwest::Error),
  #[error("API error (HTTP {status}): {message}")]
  Api { status: u16, message: String },
  #[error("response contained no content")]
  EmptyResponse,
  #[error("malformed response: {0}")]
  Malformed(String),
}

#[derive(Debug, Error)]
pub enum RagError {
  /// Missing or wrong-typed required field. Raised before any network call.
  #[error("{0}")]
  InvalidInput(String),
  /// Body could not be decoded into the request type.
  #[error("request body is malformed")]
  MalformedBody(String),
  #[error("request body is too large")]
  BodyTooLarge(String),
  #[error("authentication required")]
  Unauthenticated,
  /// The image gave nothing to ask about.
  #[error("{0}")]
  NoExtractableText(String),
  #[error("failed to create embedding")]
  Embedding(#[source] ProviderError),
  #[error("failed to query knowledge base")]
  Retrieval(#[source] ProviderError),
  #[error("failed to generate explanation")]
  Generation(#[source] ProviderError),
  #[error("failed to analyze image")]
  ImageAnalysis(#[source] ProviderError),
  #[error("{0} is not configured")]
  NotConfigured(&'static str),
}

/// Transport-level code, mirroring the callable-function status names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
  Unauthenticated,
  InvalidArgument,
  FailedPrecondition,
  Internal,
}

impl ErrorCode {
  pub fn http_status(self) -> StatusCode {
    match self {
      ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
      ErrorCode::InvalidArgument | ErrorCode::FailedPrecondition => StatusCode::BAD_REQUEST,
      ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl RagError {
  pub fn code(&self) -> ErrorCode {
    match self {
      RagError::InvalidInput(_) | RagError::MalformedBody(_) | RagError::BodyTooLarge(_) => {
        ErrorCode::InvalidArgument
      }
      RagError::Unauthenticated => ErrorCode::Unauthenticated,
      RagError::NoExtractableText(_) => ErrorCode::FailedPrecondition,
      RagError::Embedding(_)
      | RagError::Retrieval(_)
      | RagError::Generation(_)
      | RagError::ImageAnalysis(_)
      | RagError::NotConfigured(_) => ErrorCode::Internal,
    }
  }

  /// Short human-readable message. Upstream failures never leak provider text here.
  pub fn user_message(&self) -> String {
    match self {
      RagError::InvalidInput(_) | RagError::NoExtractableText(_) | RagError::Unauthenticated => self.to_string(),
      RagError::MalformedBody(_) => "Request body is malformed".into(),
      RagError::BodyTooLarge(_) => "Request body is too large".into(),
      RagError::ImageAnalysis(_) => "Failed to analyze image".into(),
      _ => "Failed to process query".into(),
    }
  }

  /// Secondary diagnostic data: the underlying provider message, if any.
  pub fn details(&self) -> Option<String> {
    match self {
      RagError::Embedding(e) | RagError::Retrieval(e) | RagError::Generation(e) | RagError::ImageAnalysis(e) => {
        Some(format!("{}: {}", self, e))
      }
      RagError::NotConfigured(_) => Some(self.to_string()),
      RagError::MalformedBody(d) | RagError::BodyTooLarge(d) => Some(d.clone()),
      _ => None,
    }
  }

  pub fn body(&self) -> ErrorBody {
    ErrorBody {
      status: self.code(),
      message: self.user_message(),
      details: self.details(),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
  pub status: ErrorCode,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

#[derive(Serialize)]
struct ErrorEnvelope {
  error: ErrorBody,
}

impl From<JsonRejection> for RagError {
  fn from(rejection: JsonRejection) -> Self {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
      RagError::BodyTooLarge(rejection.body_text())
    } else {
      RagError::MalformedBody(rejection.body_text())
    }
  }
}

impl IntoResponse for RagError {
  fn into_response(self) -> Response {
    let status = self.code().http_status();
    (status, Json(ErrorEnvelope { error: self.body() })).into_response()
  }
}
