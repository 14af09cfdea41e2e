use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{AgentKind, ClassifierKind, Settings};
use crate::embedding::embedder_for;
use crate::intent::{IntentClassifier, LlmRouter, SimilarityClassifier};
use crate::llm::{Brain, LanguageModel};
use crate::messages::{AgentMessage, MessagesPayload};
use crate::platform::HttpTransport;

pub mod echo;
pub mod passthrough;
pub mod resource_state;

pub use echo::EchoAgent;
pub use passthrough::PassthroughAgent;
pub use resource_state::ResourceStateAgent;

/// Anything that can answer a chat.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(&self, payload: MessagesPayload) -> Result<AgentMessage>;
}

/// Wires up the agent named in the settings.
pub fn build(settings: &Settings) -> Result<Arc<dyn Agent>> {
    match settings.agent {
        AgentKind::Echo => {
            info!("Using echo agent");
            Ok(Arc::new(EchoAgent))
        }
        AgentKind::Passthrough => {
            info!("Using passthrough agent");
            let brain: Arc<dyn LanguageModel> = Arc::new(Brain::new(settings)?);
            Ok(Arc::new(PassthroughAgent::new(brain, settings.model_id.clone())))
        }
        AgentKind::ResourceState => {
            let brain: Arc<dyn LanguageModel> = Arc::new(Brain::new(settings)?);
            let classifier: Arc<dyn IntentClassifier> = match settings.classifier {
                ClassifierKind::Embedding => {
                    info!(
                        model = %settings.embedding_model,
                        threshold = settings.similarity_threshold,
                        "Using embedding intent classifier"
                    );
                    Arc::new(SimilarityClassifier::new(
                        embedder_for(&settings.embedding_model),
                        settings.similarity_threshold,
                    ))
                }
                ClassifierKind::Llm => {
                    info!("Using language model intent router");
                    Arc::new(LlmRouter::new(brain.clone(), settings.model_id.clone()))
                }
            };
            if settings.host_token.is_none() {
                warn!("HOST_TOKEN is not set; platform calls will be unauthenticated");
            } else if settings.allowed_hosts.is_empty() {
                warn!("PLATFORM_HOST_ALLOWLIST is empty; HOST_TOKEN goes to any host a request names");
            }
            let transport = Arc::new(HttpTransport::new(settings.platform_timeout)?);

            Ok(Arc::new(ResourceStateAgent::new(
                brain,
                classifier,
                transport,
                settings.host_token.clone(),
                settings.model_id.clone(),
            )
            .with_allowed_hosts(settings.allowed_hosts.clone())))
        }
    }
}
