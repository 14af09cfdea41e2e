use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::Agent;
use crate::llm::LanguageModel;
use crate::messages::{AgentMessage, ChatMessage, MessagesPayload};

/// Sends the conversation to the language model untouched.
pub struct PassthroughAgent {
    llm: Arc<dyn LanguageModel>,
    model_id: String,
}

impl PassthroughAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, model_id: String) -> Self {
        Self { llm, model_id }
    }
}

#[async_trait]
impl Agent for PassthroughAgent {
    async fn invoke(&self, payload: MessagesPayload) -> Result<AgentMessage> {
        // Only role and text go upstream.
        let messages: Vec<ChatMessage> = payload
            .messages
            .into_iter()
            .map(|m| ChatMessage { role: m.role, content: m.content, platform_context: None })
            .collect();

        let content = self
            .llm
            .invoke(&messages, &self.model_id, None)
            .await
            .context("passthrough agent could not reach the language model")?;
        Ok(AgentMessage::new(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::fake::ScriptedModel;
    use crate::messages::PlatformContext;

    #[tokio::test]
    async fn forwards_messages_without_a_system_prompt() {
        let model = Arc::new(ScriptedModel::replying(&["hello there"]));
        let agent = PassthroughAgent::new(model.clone(), "m-1".into());

        let payload = MessagesPayload::new(vec![
            ChatMessage::user("hi").with_context(PlatformContext::default()),
            ChatMessage::assistant("hey"),
            ChatMessage::user("how are you"),
        ]);
        let reply = agent.invoke(payload).await.unwrap();

        assert_eq!(reply.content, "hello there");
        let calls = model.calls();
        assert_eq!(calls[0].model_id, "m-1");
        assert!(calls[0].system_prompt.is_none());
        assert_eq!(
            calls[0].messages,
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hey"), ChatMessage::user("how are you")]
        );
    }

    #[tokio::test]
    async fn surfaces_model_failures() {
        let agent = PassthroughAgent::new(Arc::new(ScriptedModel::failing("down")), "m".into());
        let err = agent.invoke(MessagesPayload::new(vec![ChatMessage::user("hi")])).await.unwrap_err();
        assert!(err.to_string().contains("language model"));
    }
}
