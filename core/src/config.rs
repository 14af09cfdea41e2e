use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_THRESHOLD: f32 = 0.9;

/// Which agent answers `/api/sendMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    ResourceState,
    Passthrough,
    Echo,
}

impl FromStr for AgentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resource-state" | "resource_state" => Ok(Self::ResourceState),
            "passthrough" => Ok(Self::Passthrough),
            "echo" => Ok(Self::Echo),
            other => bail!("unknown agent '{}': expected resource-state, passthrough or echo", other),
        }
    }
}

/// How utterances are routed to intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    Embedding,
    Llm,
}

impl FromStr for ClassifierKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedding" => Ok(Self::Embedding),
            "llm" => Ok(Self::Llm),
            other => bail!("unknown intent classifier '{}': expected embedding or llm", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub agent: AgentKind,
    pub classifier: ClassifierKind,
    pub similarity_threshold: f32,
    pub embedding_model: String,
    pub host_token: Option<String>,
    /// Hosts allowed to receive `host_token`; empty allows any.
    pub allowed_hosts: Vec<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub model_id: String,
    pub platform_timeout: Duration,
    pub llm_timeout: Duration,
}

impl Settings {
    /// Loads `.env` (if any) and reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let agent = match get("AGENT") {
            Some(v) => v.parse().context("invalid AGENT")?,
            None => AgentKind::ResourceState,
        };
        let classifier = match get("INTENT_CLASSIFIER") {
            Some(v) => v.parse().context("invalid INTENT_CLASSIFIER")?,
            None => ClassifierKind::Embedding,
        };

        let similarity_threshold = match get("INTENT_THRESHOLD") {
            Some(v) => v
                .trim()
                .parse::<f32>()
                .with_context(|| format!("INTENT_THRESHOLD '{}' is not a number", v))?,
            None => DEFAULT_THRESHOLD,
        };
        if !(-1.0..=1.0).contains(&similarity_threshold) {
            bail!("INTENT_THRESHOLD must be within [-1, 1], got {}", similarity_threshold);
        }

        let platform_timeout = secs(&get, "PLATFORM_TIMEOUT_SECS", 10)?;
        let llm_timeout = secs(&get, "LLM_TIMEOUT_SECS", 60)?;

        let settings = Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            agent,
            classifier,
            similarity_threshold,
            embedding_model: get("EMBEDDING_MODEL_NAME")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            host_token: get("HOST_TOKEN"),
            allowed_hosts: get("PLATFORM_HOST_ALLOWLIST")
                .map(|v| {
                    v.split(',')
                        .map(|h| h.trim().to_ascii_lowercase())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL"),
            model_id: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            platform_timeout,
            llm_timeout,
        };

        if settings.agent != AgentKind::Echo && settings.openai_api_key.is_none() {
            bail!("OPENAI_API_KEY must be set in .env");
        }

        Ok(settings)
    }
}

fn secs<F>(get: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => {
            let n = v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{} '{}' is not a whole number of seconds", key, v))?;
            Ok(Duration::from_secs(n))
        }
        None => Ok(Duration::from_secs(default)),
    }
}
