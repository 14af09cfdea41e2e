use anyhow::Result;
use async_trait::async_trait;

use super::Agent;
use crate::messages::{AgentMessage, MessagesPayload};

/// Repeats the latest user message. Handy for wiring checks.
pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    async fn invoke(&self, payload: MessagesPayload) -> Result<AgentMessage> {
        let reply = match payload.last_user_text() {
            Some(text) => format!("Echo: {}", text),
            None => "I heard nothing.".to_string(),
        };
        Ok(AgentMessage::new(reply))
    }
}
