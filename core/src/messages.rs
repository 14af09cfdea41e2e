use serde::{Deserialize, Serialize};

// Who wrote a message. Anything else is rejected at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

// The tenant hints the calling portal attaches to a message.
// Older portals send `duplo_base_url`, newer ones `duplo_host_url`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformContext {
    #[serde(default, alias = "duplo_base_url")]
    pub duplo_host_url: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default)]
    pub k8s_namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_context: Option<PlatformContext>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), platform_context: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), platform_context: None }
    }

    pub fn with_context(mut self, context: PlatformContext) -> Self {
        self.platform_context = Some(context);
        self
    }
}

// Input: the whole conversation so far
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesPayload {
    pub messages: Vec<ChatMessage>,
}

impl MessagesPayload {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// Index of the latest user message, if any.
    pub fn last_user_index(&self) -> Option<usize> {
        self.messages.iter().rposition(|m| m.role == Role::User)
    }

    pub fn last_user_text(&self) -> Option<&str> {
        self.last_user_index().map(|i| self.messages[i].content.as_str())
    }

    /// The most recent platform context wins; earlier ones are stale.
    pub fn latest_platform_context(&self) -> Option<&PlatformContext> {
        self.messages.iter().rev().find_map(|m| m.platform_context.as_ref())
    }
}

// Output: what the agent sends back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: Role,
    pub content: String,
}

impl AgentMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}
