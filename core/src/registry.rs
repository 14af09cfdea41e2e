use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde_json::{json, Value};

use crate::platform::PlatformError;

// Compute hosts reporting this agent platform are managed by the platform itself.
const MANAGED_AGENT_PLATFORM: i64 = 7;

// Sizes written to an autoscaling profile to park or revive it.
const ASG_STOPPED_SIZE: (i64, i64) = (0, 0);
const ASG_STARTED_SIZE: (i64, i64) = (1, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Database,
    Compute,
    AutoScalingGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
}

impl Action {
    /// Label shown while the platform carries the action out.
    pub fn progress_label(self) -> &'static str {
        match self {
            Action::Start => "starting",
            Action::Stop => "stopping",
        }
    }
}

// Placeholder segment swapped for the tenant id.
const TENANT: &str = "{tenant}";

// Static per-kind table: where to list, and which states count as on and off.
struct KindSpec {
    label: &'static str,
    list_path: &'static [&'static str],
    active_state: &'static str,
    inactive_state: &'static str,
}

const DATABASE: KindSpec = KindSpec {
    label: "RDS",
    list_path: &["v3", "subscriptions", TENANT, "aws", "rds", "instance"],
    active_state: "available",
    inactive_state: "stopped",
};

const COMPUTE: KindSpec = KindSpec {
    label: "EC2",
    list_path: &["subscriptions", TENANT, "GetNativeHosts"],
    active_state: "running",
    inactive_state: "stopped",
};

const AUTOSCALING: KindSpec = KindSpec {
    label: "ASG",
    list_path: &["subscriptions", TENANT, "GetTenantAsgProfiles"],
    active_state: "running",
    inactive_state: "stopped",
};

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] =
        [ResourceKind::Database, ResourceKind::Compute, ResourceKind::AutoScalingGroup];

    fn spec(self) -> &'static KindSpec {
        match self {
            ResourceKind::Database => &DATABASE,
            ResourceKind::Compute => &COMPUTE,
            ResourceKind::AutoScalingGroup => &AUTOSCALING,
        }
    }

    pub fn label(self) -> &'static str {
        self.spec().label
    }

    pub fn active_state(self) -> &'static str {
        self.spec().active_state
    }

    pub fn inactive_state(self) -> &'static str {
        self.spec().inactive_state
    }

    pub fn list_url(self, host_url: &str, tenant_id: &str) -> Result<String, PlatformError> {
        let segments: Vec<&str> = self
            .spec()
            .list_path
            .iter()
            .map(|s| if *s == TENANT { tenant_id } else { *s })
            .collect();
        endpoint(host_url, &segments)
    }

    /// The POST that starts or stops one record, or `None` when the record
    /// lacks the identifier the endpoint needs.
    pub fn action_request(
        self,
        host_url: &str,
        tenant_id: &str,
        record: &ResourceRecord,
        action: Action,
    ) -> Result<Option<ActionRequest>, PlatformError> {
        let verb = match action {
            Action::Start => "start",
            Action::Stop => "stop",
        };
        let request = match (self, &record.details) {
            (ResourceKind::Database, _) if !record.name.is_empty() => ActionRequest {
                url: endpoint(
                    host_url,
                    &[
                        "v3",
                        "subscriptions",
                        tenant_id,
                        "aws",
                        "rds",
                        "instance",
                        record.name.as_str(),
                        verb,
                    ],
                )?,
                body: None,
            },
            (ResourceKind::Compute, ResourceDetails::Compute { instance_id: Some(id) })
                if !id.is_empty() =>
            {
                let target = format!("{}NativeHost", verb);
                let segments = ["subscriptions", tenant_id, target.as_str(), id.as_str()];
                ActionRequest {
                    url: endpoint(host_url, &segments)?,
                    body: None,
                }
            }
            (ResourceKind::AutoScalingGroup, _) if !record.name.is_empty() => {
                let (min_size, max_size) = match action {
                    Action::Start => ASG_STARTED_SIZE,
                    Action::Stop => ASG_STOPPED_SIZE,
                };
                ActionRequest {
                    url: endpoint(host_url, &["subscriptions", tenant_id, "UpdateTenantAsgProfile"])?,
                    body: Some(json!({
                        "FriendlyName": record.name,
                        "MaxSize": max_size,
                        "MinSize": min_size,
                    })),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(request))
    }

    /// Maps one raw listing entry into a record. Platform-managed compute
    /// agents are dropped.
    pub fn project(self, raw: &Value) -> Option<ResourceRecord> {
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);
        let number = |key: &str| raw.get(key).and_then(Value::as_i64);

        let record = match self {
            ResourceKind::Database => ResourceRecord {
                kind: self,
                name: text("Identifier").unwrap_or_default(),
                state: text("InstanceStatus").unwrap_or_default(),
                details: ResourceDetails::Database {
                    engine: text("Engine"),
                    allocated_storage: number("AllocatedStorage"),
                },
            },
            ResourceKind::Compute => {
                if number("AgentPlatform") == Some(MANAGED_AGENT_PLATFORM) {
                    return None;
                }
                ResourceRecord {
                    kind: self,
                    name: text("FriendlyName").unwrap_or_default(),
                    state: text("Status").unwrap_or_default(),
                    details: ResourceDetails::Compute { instance_id: text("InstanceId") },
                }
            }
            ResourceKind::AutoScalingGroup => {
                let min_size = number("MinSize").unwrap_or(0);
                let max_size = number("MaxSize").unwrap_or(0);
                // No state field for profiles: sized up means running.
                let state = if max_size > 0 && min_size > 0 {
                    self.active_state()
                } else {
                    self.inactive_state()
                };
                ResourceRecord {
                    kind: self,
                    name: text("FriendlyName").unwrap_or_default(),
                    state: state.to_string(),
                    details: ResourceDetails::AutoScalingGroup { min_size, max_size },
                }
            }
        };
        Some(record)
    }
}

/// Appends `segments` to the host URL, percent-encoding each one so ids
/// cannot add path components or a query.
fn endpoint(host_url: &str, segments: &[&str]) -> Result<String, PlatformError> {
    let invalid = || PlatformError::InvalidHost(host_url.to_string());
    let mut url = Url::parse(host_url).map_err(|_| invalid())?;
    url.path_segments_mut().map_err(|_| invalid())?.pop_if_empty().extend(segments);
    Ok(url.into())
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ResourceKind {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rds" | "database" => Ok(ResourceKind::Database),
            "ec2" | "compute" => Ok(ResourceKind::Compute),
            "asg" | "autoscalinggroup" | "autoscaling" => Ok(ResourceKind::AutoScalingGroup),
            _ => Err(PlatformError::UnsupportedKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDetails {
    Database { engine: Option<String>, allocated_storage: Option<i64> },
    Compute { instance_id: Option<String> },
    AutoScalingGroup { min_size: i64, max_size: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub name: String,
    pub state: String,
    pub details: ResourceDetails,
}

impl ResourceRecord {
    pub fn is_active(&self) -> bool {
        self.state.eq_ignore_ascii_case(self.kind.active_state())
    }

    pub fn is_inactive(&self) -> bool {
        self.state.eq_ignore_ascii_case(self.kind.inactive_state())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub url: String,
    pub body: Option<Value>,
}
