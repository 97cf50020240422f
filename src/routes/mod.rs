//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRequest},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::error::RagError;
use crate::state::AppState;

pub mod http;
pub mod ws;

/// JSON body whose rejection renders as an `INVALID_ARGUMENT` error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(RagError))]
pub struct ApiJson<T>(pub T);

/// Build the application router with:
/// - WebSocket at `/ws`
/// - JSON API under `/api/v1/...`, image routes with their own body limit
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let image_limit = DefaultBodyLimit::max(state.max_image_body);
    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/rag/query", post(http::http_rag_query))
        .route("/api/v1/image/analyze", post(http::http_analyze_image).layer(image_limit))
        .route("/api/v1/image/query", post(http::http_image_query).layer(image_limit))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use base64::{engine::general_purpose::STANDARD, Engine as _};

    use crate::config::{Prompts, RagSettings, DEFAULT_MAX_IMAGE_BODY_BYTES};
    use crate::image::ImageAnalyzer;
    use crate::protocol::{ClientWsMessage, ServerWsMessage};
    use crate::providers::fakes::{scored, FakeCompletion, FakeEmbedder, FakeIndex};
    use crate::rag::{RagPipeline, NO_CONTEXT_EXPLANATION};
    use crate::state::AuthPolicy;

    const ANALYSIS_JSON: &str = r#"{"extractedText": "A train travels 120 miles in 2 hours. What is its speed?", "mathProblems": [{"problem": "120 / 2", "type": "word_problem", "difficulty": "elementary"}], "confidence": 88, "suggestedQuery": "How do I find the speed?"}"#;

    fn state_with(index: FakeIndex, reply: &str) -> Arc<AppState> {
        state_and_completion(index, reply).0
    }

    fn state_and_completion(index: FakeIndex, reply: &str) -> (Arc<AppState>, Arc<FakeCompletion>) {
        let completion = Arc::new(FakeCompletion::replying(reply));
        let pipeline = RagPipeline::new(
            Arc::new(FakeEmbedder::ok()),
            Arc::new(index),
            completion.clone(),
            Prompts::default(),
            RagSettings::default(),
        );
        let analyzer = ImageAnalyzer::new(completion.clone(), Prompts::default(), RagSettings::default());
        let state = Arc::new(AppState {
            pipeline: Some(Arc::new(pipeline)),
            analyzer: Some(Arc::new(analyzer)),
            auth: AuthPolicy::from_list(Some("test-token")),
            max_image_body: DEFAULT_MAX_IMAGE_BODY_BYTES,
        });
        (state, completion)
    }

    fn unconfigured() -> Arc<AppState> {
        Arc::new(AppState {
            pipeline: None,
            analyzer: None,
            auth: AuthPolicy::default(),
            max_image_body: DEFAULT_MAX_IMAGE_BODY_BYTES,
        })
    }

    fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(state: Arc<AppState>, req: Request<Body>) -> (StatusCode, Value) {
        let resp = build_router(state).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let req = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
        let (status, body) = send(unconfigured(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "ragEnabled": false, "imageEnabled": false}));
    }

    #[tokio::test]
    async fn missing_or_wrong_token_is_401() {
        let state = state_with(FakeIndex::empty(), "x");
        let (status, body) = send(state.clone(), post("/api/v1/rag/query", None, json!({"query": "slope"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["status"], "UNAUTHENTICATED");

        let (status, _) = send(state, post("/api/v1/rag/query", Some("nope"), json!({"query": "slope"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn blank_query_is_400() {
        let state = state_with(FakeIndex::empty(), "x");
        let (status, body) = send(state, post("/api/v1/rag/query", Some("test-token"), json!({"query": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["status"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn malformed_body_is_400_envelope() {
        let state = state_with(FakeIndex::empty(), "x");
        let (status, body) = send(state, post("/api/v1/rag/query", Some("test-token"), json!({"query": 42}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["status"], "INVALID_ARGUMENT");
        assert_eq!(body["error"]["message"], "Request body is malformed");
        assert!(body["error"]["details"].as_str().unwrap().contains("invalid type"));
    }

    #[tokio::test]
    async fn phone_sized_inline_photo_is_accepted() {
        let (state, completion) = state_and_completion(FakeIndex::empty(), ANALYSIS_JSON);
        let photo = STANDARD.encode(vec![0xABu8; 3 * 1024 * 1024]);
        let req = post(
            "/api/v1/image/analyze",
            Some("test-token"),
            json!({"imageBase64": photo, "mimeType": "image/jpeg"}),
        );
        let (status, body) = send(state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["confidence"], 88);
        let calls = completion.image_calls.lock().unwrap();
        assert!(calls[0].1.starts_with("data:image/jpeg;base64,q6ur"));
    }

    #[tokio::test]
    async fn oversized_image_body_is_reported_as_too_large() {
        let (state, _) = state_and_completion(FakeIndex::empty(), ANALYSIS_JSON);
        let state = Arc::new(AppState { max_image_body: 64 * 1024, ..(*state).clone() });
        let photo = STANDARD.encode(vec![0u8; 128 * 1024]);
        let req = post("/api/v1/image/query", Some("test-token"), json!({"imageBase64": photo}));
        let (status, body) = send(state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["status"], "INVALID_ARGUMENT");
        assert_eq!(body["error"]["message"], "Request body is too large");
    }

    #[tokio::test]
    async fn rag_query_returns_result() {
        let index = FakeIndex::with_matches(vec![
            scored(0.9, Some("Elementary_Algebra_2e"), "ax^2 + bx + c = 0"),
            scored(0.7, Some("Intermediate_Algebra_2e"), "factoring"),
        ]);
        let state = state_with(index, "A quadratic has degree two.");
        let req = post(
            "/api/v1/rag/query",
            Some("test-token"),
            json!({"query": "What is a quadratic equation?", "queryType": "definition"}),
        );
        let (status, body) = send(state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["explanation"], "A quadratic has degree two.");
        assert_eq!(body["confidence"], 80.0);
        assert_eq!(body["sources"][0]["relevanceScore"], 90);
        assert_eq!(body["suggestedActions"][0]["type"], "related_concept");
    }

    #[tokio::test]
    async fn empty_index_gives_no_context_answer() {
        let state = state_with(FakeIndex::empty(), "unused");
        let (status, body) =
            send(state, post("/api/v1/rag/query", Some("test-token"), json!({"query": "What is a tesseract?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["explanation"], NO_CONTEXT_EXPLANATION);
        assert_eq!(body["confidence"], 0.0);
        assert_eq!(body["sources"], json!([]));
    }

    #[tokio::test]
    async fn unconfigured_services_are_internal() {
        let (status, body) =
            send(unconfigured(), post("/api/v1/rag/query", Some("any"), json!({"query": "slope"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["status"], "INTERNAL");
        assert_eq!(body["error"]["details"], "knowledge base is not configured");
    }

    #[tokio::test]
    async fn analyze_image_decodes_model_json() {
        let state = state_with(FakeIndex::empty(), ANALYSIS_JSON);
        let req = post(
            "/api/v1/image/analyze",
            Some("test-token"),
            json!({"imageUrl": "https://example.com/hw.png", "gradeLevel": "4th grade"}),
        );
        let (status, body) = send(state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["confidence"], 88);
        assert_eq!(body["mathProblems"][0]["type"], "word_problem");
    }

    #[tokio::test]
    async fn analyze_image_without_image_is_400() {
        let state = state_with(FakeIndex::empty(), ANALYSIS_JSON);
        let (status, _) = send(state, post("/api/v1/image/analyze", Some("test-token"), json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn image_query_classifies_and_answers() {
        let index = FakeIndex::with_matches(vec![scored(0.8, Some("Prealgebra_2e"), "rate = distance / time")]);
        let state = state_with(index, ANALYSIS_JSON);
        let req = post(
            "/api/v1/image/query",
            Some("test-token"),
            json!({"imageBase64": "aGk=", "mimeType": "image/png"}),
        );
        let (status, body) = send(state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queryType"], "homework_help");
        assert!(body["query"].as_str().unwrap().starts_with("How do I find the speed?\n\nFrom the image: A train"));
        assert_eq!(body["result"]["confidence"], 80.0);
    }

    #[tokio::test]
    async fn image_query_forwards_analysis_type() {
        let index = FakeIndex::with_matches(vec![scored(0.8, Some("Geometry"), "angles in a triangle sum to 180")]);
        let (state, completion) = state_and_completion(index, ANALYSIS_JSON);
        let req = post(
            "/api/v1/image/query",
            Some("test-token"),
            json!({"imageUrl": "https://example.com/triangle.png", "analysisType": "geometry"}),
        );
        let (status, _) = send(state, req).await;
        assert_eq!(status, StatusCode::OK);
        let calls = completion.image_calls.lock().unwrap();
        assert!(calls[0].0.contains("Analysis focus: geometry."));
    }

    #[tokio::test]
    async fn image_without_text_or_question_is_failed_precondition() {
        let state = state_with(FakeIndex::empty(), r#"{"mathProblems": []}"#);
        let req = post("/api/v1/image/query", Some("test-token"), json!({"imageUrl": "https://example.com/blank.png"}));
        let (status, body) = send(state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["status"], "FAILED_PRECONDITION");
    }

    #[tokio::test]
    async fn ws_dispatch_replies_per_message() {
        let state = state_with(FakeIndex::empty(), "unused");
        let pong = ws::handle_client_ws(ClientWsMessage::Ping, &state).await;
        assert!(matches!(pong, ServerWsMessage::Pong));

        let msg: ClientWsMessage = serde_json::from_value(json!({"type": "rag_query", "query": ""})).unwrap();
        let v = serde_json::to_value(ws::handle_client_ws(msg, &state).await).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["error"]["status"], "INVALID_ARGUMENT");

        let msg: ClientWsMessage = serde_json::from_value(json!({"type": "rag_query", "query": "What is pi?"})).unwrap();
        let v = serde_json::to_value(ws::handle_client_ws(msg, &state).await).unwrap();
        assert_eq!(v["type"], "rag_result");
        assert_eq!(v["result"]["explanation"], NO_CONTEXT_EXPLANATION);
    }
}
