use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Settings;
use crate::messages::{ChatMessage, Role};

/// The hosted language model, seen as `{messages, model_id, system_prompt} -> text`.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        model_id: &str,
        system_prompt: Option<&str>,
    ) -> Result<String>;
}

pub struct Brain {
    client: Client<OpenAIConfig>,
}

impl Brain {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .openai_api_key
            .clone()
            .context("OPENAI_API_KEY must be set in .env")?;

        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = &settings.openai_base_url {
            config = config.with_api_base(base);
        }

        let http = reqwest::Client::builder()
            .timeout(settings.llm_timeout)
            .build()
            .context("failed to build language model HTTP client")?;
        let client = Client::with_config(config).with_http_client(http);

        info!("Brain connected. Default model: {}", settings.model_id);
        Ok(Self { client })
    }
}

#[async_trait]
impl LanguageModel for Brain {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        model_id: &str,
        system_prompt: Option<&str>,
    ) -> Result<String> {
        // 1. Convert our conversation -> OpenAI messages
        let mut request_messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system_prompt {
            request_messages.push(
                ChatCompletionRequestSystemMessageArgs::default().content(system).build()?.into(),
            );
        }
        for message in messages {
            let converted: ChatCompletionRequestMessage = match message.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content.as_str())
                    .build()?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content.as_str())
                    .build()?
                    .into(),
            };
            request_messages.push(converted);
        }

        // 2. Prepare the Request
        let request = CreateChatCompletionRequestArgs::default()
            .model(model_id)
            .messages(request_messages)
            .build()?;

        // 3. Send to AI
        debug!(model = model_id, turns = messages.len(), "Invoking language model");
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("language model request failed")?;

        Ok(response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use anyhow::anyhow;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Call {
        pub messages: Vec<ChatMessage>,
        pub model_id: String,
        pub system_prompt: Option<String>,
    }

    /// Replies from a script (or echoes the last message) and records calls.
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub calls: Mutex<Vec<Call>>,
    }

    impl ScriptedModel {
        pub fn replying(replies: &[&str]) -> Self {
            let model = Self::default();
            model.replies.lock().unwrap().extend(replies.iter().map(|r| Ok(r.to_string())));
            model
        }

        pub fn failing(reason: &str) -> Self {
            let model = Self::default();
            model.replies.lock().unwrap().push_back(Err(reason.to_string()));
            model
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn invoke(
            &self,
            messages: &[ChatMessage],
            model_id: &str,
            system_prompt: Option<&str>,
        ) -> Result<String> {
            self.calls.lock().unwrap().push(Call {
                messages: messages.to_vec(),
                model_id: model_id.to_string(),
                system_prompt: system_prompt.map(str::to_string),
            });
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(reason)) => Err(anyhow!(reason)),
                None => Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default()),
            }
        }
    }
}
