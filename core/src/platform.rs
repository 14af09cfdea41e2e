use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::messages::PlatformContext;
use crate::registry::{Action, ResourceKind, ResourceRecord};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("unsupported resource type: {0}")]
    UnsupportedKind(String),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("unexpected payload from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("cannot build platform URLs from host '{0}'")]
    InvalidHost(String),
}

/// The tenant a request is about. Lives for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub host_url: String,
    pub tenant_id: String,
    pub tenant_name: String,
}

impl TenantContext {
    pub fn new(
        host_url: impl Into<String>,
        tenant_id: impl Into<String>,
        tenant_name: impl Into<String>,
    ) -> Self {
        let host_url: String = host_url.into();
        Self {
            host_url: host_url.trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
            tenant_name: tenant_name.into(),
        }
    }

    /// Needs at least a host and a tenant id to address anything.
    pub fn from_platform(ctx: &PlatformContext) -> Option<Self> {
        let host = ctx.duplo_host_url.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        let tenant_id = ctx.tenant_id.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        Some(Self::new(host, tenant_id, ctx.tenant_name.clone().unwrap_or_default()))
    }
}

/// Authenticated JSON calls against the management platform.
#[async_trait]
pub trait PlatformTransport: Send + Sync {
    async fn get_json(&self, url: &str, token: Option<&str>) -> Result<Value, PlatformError>;

    async fn post_json(
        &self,
        url: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<(), PlatformError>;
}

/// reqwest-backed transport. Certificates are always verified.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build platform HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PlatformTransport for HttpTransport {
    async fn get_json(&self, url: &str, token: Option<&str>) -> Result<Value, PlatformError> {
        let mut req = self.client.get(url).header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }

        let response = req
            .send()
            .await
            .map_err(|source| PlatformError::Transport { url: url.to_string(), source })?;
        if !response.status().is_success() {
            return Err(PlatformError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| PlatformError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn post_json(
        &self,
        url: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<(), PlatformError> {
        let mut req = self.client.post(url).header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req
            .send()
            .await
            .map_err(|source| PlatformError::Transport { url: url.to_string(), source })?;
        if !response.status().is_success() {
            return Err(PlatformError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Records grouped by kind, in `ResourceKind::ALL` order.
pub type ResourcesByKind = BTreeMap<ResourceKind, Vec<ResourceRecord>>;

/// What a bulk start/stop touched.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub acted_on: ResourcesByKind,
    pub failed: Vec<(ResourceRecord, String)>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.acted_on.values().all(Vec::is_empty)
    }

    pub fn attempted(&self) -> usize {
        self.acted_on.values().map(Vec::len).sum()
    }
}

/// Reads and drives one tenant's resources.
///
/// Listings are fetched fresh on every call; nothing is cached, so a
/// running/stopped split is only as current as the read it came from.
pub struct ResourceGateway {
    transport: Arc<dyn PlatformTransport>,
    tenant: TenantContext,
    token: Option<String>,
}

impl ResourceGateway {
    pub fn new(
        transport: Arc<dyn PlatformTransport>,
        tenant: TenantContext,
        token: Option<String>,
    ) -> Self {
        Self { transport, tenant, token }
    }

    pub fn tenant(&self) -> &TenantContext {
        &self.tenant
    }

    /// One listing read, with failures surfaced.
    pub async fn fetch(&self, kind: ResourceKind) -> Result<Vec<ResourceRecord>, PlatformError> {
        let url = kind.list_url(&self.tenant.host_url, &self.tenant.tenant_id)?;
        let payload = self.transport.get_json(&url, self.token.as_deref()).await?;
        let entries = payload.as_array().ok_or_else(|| PlatformError::Decode {
            url: url.clone(),
            reason: "expected a JSON array".to_string(),
        })?;
        Ok(entries.iter().filter_map(|raw| kind.project(raw)).collect())
    }

    /// Like `fetch`, but a failed read degrades to an empty listing.
    pub async fn list(&self, kind: ResourceKind) -> Vec<ResourceRecord> {
        match self.fetch(kind).await {
            Ok(records) => records,
            Err(e) => {
                error!(
                    kind = %kind,
                    tenant_id = %self.tenant.tenant_id,
                    error = %e,
                    "Error fetching resources"
                );
                Vec::new()
            }
        }
    }

    /// Records of `kind` in its active (or inactive) state. Records in any
    /// other state appear in neither partition.
    pub async fn filter(&self, kind: ResourceKind, active: bool) -> Vec<ResourceRecord> {
        self.list(kind)
            .await
            .into_iter()
            .filter(|r| if active { r.is_active() } else { r.is_inactive() })
            .collect()
    }

    /// `filter` across several kinds (all when `kind` is `None`).
    pub async fn filter_all(&self, kind: Option<ResourceKind>, active: bool) -> ResourcesByKind {
        let kinds: Vec<ResourceKind> = match kind {
            Some(k) => vec![k],
            None => ResourceKind::ALL.to_vec(),
        };
        let mut grouped = ResourcesByKind::new();
        for kind in kinds {
            grouped.insert(kind, self.filter(kind, active).await);
        }
        grouped
    }

    /// Stops what is running. Each resource is attempted once; failures are
    /// logged and the batch carries on.
    pub async fn stop(&self, kind: Option<ResourceKind>, name: Option<&str>) -> BatchReport {
        self.run_batch(Action::Stop, kind, name).await
    }

    /// Starts what is stopped, same rules as `stop`.
    pub async fn start(&self, kind: Option<ResourceKind>, name: Option<&str>) -> BatchReport {
        self.run_batch(Action::Start, kind, name).await
    }

    async fn run_batch(
        &self,
        action: Action,
        kind: Option<ResourceKind>,
        name: Option<&str>,
    ) -> BatchReport {
        // Only start what is stopped, only stop what is running.
        let want_active = action == Action::Stop;
        let mut candidates = self.filter_all(kind, want_active).await;
        if let Some(name) = name {
            for records in candidates.values_mut() {
                records.retain(|r| r.name == name);
            }
        }

        let mut report = BatchReport::default();
        for (kind, records) in candidates {
            let mut acted_on = Vec::with_capacity(records.len());
            for record in records {
                let request = match kind.action_request(
                    &self.tenant.host_url,
                    &self.tenant.tenant_id,
                    &record,
                    action,
                ) {
                    Ok(Some(request)) => request,
                    Ok(None) => {
                        warn!(kind = %kind, name = %record.name, "Resource has no usable identifier, skipping");
                        continue;
                    }
                    Err(e) => {
                        error!(kind = %kind, name = %record.name, error = %e, "Resource action failed");
                        report.failed.push((record, e.to_string()));
                        continue;
                    }
                };

                info!(
                    kind = %kind,
                    name = %record.name,
                    endpoint = %request.url,
                    action = action.progress_label(),
                    "Sending resource action"
                );
                if let Err(e) = self
                    .transport
                    .post_json(&request.url, self.token.as_deref(), request.body.as_ref())
                    .await
                {
                    error!(kind = %kind, name = %record.name, error = %e, "Resource action failed");
                    report.failed.push((record.clone(), e.to_string()));
                }
                acted_on.push(record);
            }
            report.acted_on.insert(kind, acted_on);
        }
        report
    }
}
