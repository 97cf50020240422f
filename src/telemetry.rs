//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! - LOG_LEVEL controls the filter (e.g. "debug" or full directives like
//!   "info,rag=debug,image=debug,ingest=info,tower_http=info").
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.
//!
//! Targets in use: `mathsnap_backend` (startup, transport), `rag` (pipeline),
//! `image` (vision analysis), `ingest` (knowledge-base build), plus the
//! per-request spans from tower-http's TraceLayer.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,rag=debug,image=debug,mathsnap_backend=debug,tower_http=info,axum=info";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => {
            builder.json().init();
        }
        _ => {
            builder.init();
        }
    }
}
