use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use tracing::{info, warn};

use super::Agent;
use crate::intent::{Intent, IntentClassifier};
use crate::llm::LanguageModel;
use crate::messages::{AgentMessage, ChatMessage, MessagesPayload};
use crate::platform::{PlatformTransport, ResourceGateway, ResourcesByKind, TenantContext};
use crate::prompt::{system_prompt, ContextBlock};
use crate::registry::Action;

pub const NO_RESOURCE_FOUND: &str = "no resource found";

/// Renders resources grouped by kind:
///
/// ```text
///
/// RDS
///   - db1: available
/// ```
///
/// Empty kinds are skipped. With `label` set, every record shows that label
/// instead of its fetched state.
pub fn format_resource_state(resources: &ResourcesByKind, label: Option<&str>) -> String {
    let mut lines = Vec::new();
    for (kind, records) in resources {
        if records.is_empty() {
            continue;
        }
        lines.push(format!("\n{}", kind.label()));
        for record in records {
            let state = label.unwrap_or(&record.state);
            lines.push(format!("  - {}: {}", record.name, state));
        }
    }
    lines.join("\n")
}

/// What one classified utterance turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub intent: Intent,
    /// Replaces the latest user message; `None` keeps it as written.
    pub content: Option<String>,
    pub block: Option<ContextBlock>,
}

impl Resolution {
    fn passthrough(intent: Intent) -> Self {
        Self { intent, content: None, block: None }
    }
}

/// The conversation orchestrator: resolves the tenant, classifies the latest
/// user message, acts on the platform and hands the enriched conversation to
/// the language model.
///
/// Stateless across calls; the tenant arrives with every request. Stop and
/// start intents change real resources before any reply is generated.
pub struct ResourceStateAgent {
    llm: Arc<dyn LanguageModel>,
    classifier: Arc<dyn IntentClassifier>,
    transport: Arc<dyn PlatformTransport>,
    host_token: Option<String>,
    model_id: String,
    allowed_hosts: Vec<String>,
}

impl ResourceStateAgent {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        classifier: Arc<dyn IntentClassifier>,
        transport: Arc<dyn PlatformTransport>,
        host_token: Option<String>,
        model_id: String,
    ) -> Self {
        Self { llm, classifier, transport, host_token, model_id, allowed_hosts: Vec::new() }
    }

    /// Restricts which platform hosts receive the bearer token. Empty means
    /// any host named in the request's platform context.
    pub fn with_allowed_hosts(mut self, hosts: Vec<String>) -> Self {
        self.allowed_hosts = hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect();
        self
    }

    fn host_allowed(&self, tenant: &TenantContext) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        Url::parse(&tenant.host_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|host| self.allowed_hosts.contains(&host))
    }

    pub async fn resolve(&self, tenant: Option<&TenantContext>, utterance: &str) -> Resolution {
        let Some(tenant) = tenant else {
            info!("No tenant context on the request, passing the message through");
            return Resolution::passthrough(Intent::Unknown);
        };

        let intent = self.classifier.classify(utterance).await;
        info!(?intent, "Classified utterance");
        let gateway =
            ResourceGateway::new(self.transport.clone(), tenant.clone(), self.host_token.clone());

        match intent {
            Intent::Unknown => Resolution::passthrough(intent),
            Intent::TenantDetails => Resolution {
                intent,
                content: None,
                block: Some(ContextBlock::TenantDetails),
            },
            Intent::ListRunning | Intent::ListStopped => {
                let running = intent == Intent::ListRunning;
                let resources = gateway.filter_all(None, running).await;
                let rendered = format_resource_state(&resources, None);
                if rendered.is_empty() {
                    return not_found(intent);
                }
                let which = if running { "running" } else { "stopped" };
                Resolution {
                    intent,
                    content: Some(format!(
                        "Here are the {} resources for tenant {}:\n\n{}",
                        which, tenant.tenant_name, rendered
                    )),
                    block: Some(ContextBlock::Listing { running, rendered }),
                }
            }
            Intent::StopAll | Intent::StartAll => {
                let action = if intent == Intent::StopAll { Action::Stop } else { Action::Start };
                let report = match action {
                    Action::Stop => gateway.stop(None, None).await,
                    Action::Start => gateway.start(None, None).await,
                };
                info!(
                    ?intent,
                    attempted = report.attempted(),
                    failed = report.failed.len(),
                    tenant_id = %tenant.tenant_id,
                    "Bulk resource action finished"
                );

                let rendered =
                    format_resource_state(&report.acted_on, Some(action.progress_label()));
                if rendered.is_empty() {
                    return not_found(intent);
                }
                let (verb, block) = match action {
                    Action::Stop => {
                        ("Stopping", ContextBlock::StopInProgress { rendered: rendered.clone() })
                    }
                    Action::Start => {
                        ("Starting", ContextBlock::StartInProgress { rendered: rendered.clone() })
                    }
                };
                Resolution {
                    intent,
                    content: Some(format!(
                        "{} all resources for tenant {}...\n\n{}",
                        verb, tenant.tenant_name, rendered
                    )),
                    block: Some(block),
                }
            }
        }
    }
}

fn not_found(intent: Intent) -> Resolution {
    Resolution {
        intent,
        content: Some(NO_RESOURCE_FOUND.to_string()),
        block: Some(ContextBlock::NotFound),
    }
}

#[async_trait]
impl Agent for ResourceStateAgent {
    async fn invoke(&self, payload: MessagesPayload) -> Result<AgentMessage> {
        let tenant = payload
            .latest_platform_context()
            .and_then(TenantContext::from_platform)
            .filter(|t| {
                let allowed = self.host_allowed(t);
                if !allowed {
                    warn!(host = %t.host_url, "Platform host is not on the allowlist, ignoring tenant");
                }
                allowed
            });
        if let Some(tenant) = &tenant {
            info!(tenant_id = %tenant.tenant_id, tenant_name = %tenant.tenant_name, "Tenant context resolved");
        }

        let mut messages: Vec<ChatMessage> = payload
            .messages
            .iter()
            .map(|m| ChatMessage { role: m.role, content: m.content.clone(), platform_context: None })
            .collect();

        let mut block = None;
        if let Some(index) = payload.last_user_index() {
            let resolution = self.resolve(tenant.as_ref(), &payload.messages[index].content).await;
            if let Some(content) = resolution.content {
                messages[index].content = content;
            }
            block = resolution.block;
        }

        let prompt = system_prompt(tenant.as_ref(), block.as_ref());
        let content = self
            .llm
            .invoke(&messages, &self.model_id, Some(&prompt))
            .await
            .context("resource state agent could not reach the language model")?;
        Ok(AgentMessage::new(content))
    }
}
