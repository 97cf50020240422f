//! Application state: the RAG pipeline, the image analyzer, and the auth policy.
//!
//! Both services are optional. A missing OpenAI or Pinecone key leaves the
//! server up, and the affected operations answer `NotConfigured`.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::config::{load_agent_config_from_env, AgentConfig};
use crate::image::ImageAnalyzer;
use crate::providers::openai::OpenAI;
use crate::providers::pinecone::Pinecone;
use crate::rag::RagPipeline;

/// Who may call the authenticated endpoints.
#[derive(Clone, Debug, Default)]
pub struct AuthPolicy {
    /// `None` accepts any non-empty bearer token.
    pub allowed: Option<HashSet<String>>,
}

impl AuthPolicy {
    pub fn from_env() -> Self {
        Self::from_list(std::env::var("MATHSNAP_API_TOKENS").ok().as_deref())
    }

    pub fn from_list(list: Option<&str>) -> Self {
        let allowed = list
            .map(|l| {
                l.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect::<HashSet<_>>()
            })
            .filter(|set| !set.is_empty());
        Self { allowed }
    }

    pub fn accepts(&self, token: &str) -> bool {
        let token = token.trim();
        if token.is_empty() {
            return false;
        }
        match &self.allowed {
            Some(set) => set.contains(token),
            None => true,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Option<Arc<RagPipeline>>,
    pub analyzer: Option<Arc<ImageAnalyzer>>,
    pub auth: AuthPolicy,
    /// Body limit applied to the `/api/v1/image/*` routes.
    pub max_image_body: usize,
}

impl AppState {
    /// Build state from env: load config, wire OpenAI and Pinecone when their keys are present.
    #[instrument(level = "info", skip_all)]
    pub async fn from_env() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();
        let AgentConfig { prompts, rag } = cfg;

        let openai = OpenAI::from_env().map(Arc::new);
        match &openai {
            Some(oa) => info!(
                target: "mathsnap_backend",
                base_url = %oa.base_url,
                chat_model = %oa.chat_model,
                vision_model = %oa.vision_model,
                embedding_model = %oa.embedding_model,
                "OpenAI enabled."
            ),
            None => warn!(target: "mathsnap_backend", "OpenAI disabled (no OPENAI_API_KEY). RAG and image analysis unavailable."),
        }

        let pinecone = match Pinecone::from_env().await {
            Some(Ok(pc)) => {
                info!(target: "mathsnap_backend", index = %pc.index_name, host = %pc.host, "Pinecone enabled.");
                Some(Arc::new(pc))
            }
            Some(Err(e)) => {
                error!(target: "mathsnap_backend", error = %e, "Pinecone setup failed; RAG unavailable.");
                None
            }
            None => {
                warn!(target: "mathsnap_backend", "Pinecone disabled (no PINECONE_API_KEY). RAG unavailable.");
                None
            }
        };

        let pipeline = match (&openai, &pinecone) {
            (Some(oa), Some(pc)) => Some(Arc::new(RagPipeline::new(
                oa.clone(),
                pc.clone(),
                oa.clone(),
                prompts.clone(),
                rag.clone(),
            ))),
            _ => None,
        };
        let max_image_body = rag.max_image_body_bytes;
        let analyzer = openai.map(|oa| Arc::new(ImageAnalyzer::new(oa, prompts, rag)));

        let auth = AuthPolicy::from_env();
        match &auth.allowed {
            Some(set) => info!(target: "mathsnap_backend", tokens = set.len(), "API token allow-list active"),
            None => warn!(target: "mathsnap_backend", "MATHSNAP_API_TOKENS not set; accepting any bearer token"),
        }

        Self { pipeline, analyzer, auth, max_image_body }
    }
}
