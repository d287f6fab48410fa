pub mod openai;

pub use openai::OpenAICompatibleClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::integrations::IntegrationError;
use crate::models::{ChatMessage, ChatRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub content: String,
}

impl AgentMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for AgentMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: match message.role {
                ChatRole::User => MessageRole::User,
                ChatRole::Assistant => MessageRole::Assistant,
            },
            content: message.message.clone(),
        }
    }
}

/// A chat completion backend
#[async_trait]
pub trait AgentProvider: Send + Sync {
    async fn complete(&self, messages: Vec<AgentMessage>) -> Result<String, IntegrationError>;
}

/// Number of prior task messages sent as context
pub const AGENT_HISTORY_LIMIT: usize = 20;

pub const AGENT_SYSTEM_PROMPT: &str = "You are Hive, an engineering assistant working inside a \
software team's workspace. Answer questions about the task at hand concisely and concretely. \
When you propose code changes, show the code.";

/// System prompt followed by the conversation history
pub fn build_agent_messages(task_title: &str, history: &[ChatMessage]) -> Vec<AgentMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(AgentMessage::system(format!(
        "{}\n\nCurrent task: {}",
        AGENT_SYSTEM_PROMPT, task_title
    )));
    messages.extend(
        history
            .iter()
            .filter(|m| !m.message.trim().is_empty())
            .map(AgentMessage::from),
    );
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageStatus;
    use chrono::Utc;

    fn chat(role: ChatRole, text: &str) -> ChatMessage {
        ChatMessage {
            id: text.to_string(),
            task_id: "t".to_string(),
            message: text.to_string(),
            role,
            status: MessageStatus::Sent,
            context_tags: vec![],
            artifacts: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_agent_messages() {
        let history = vec![
            chat(ChatRole::User, "How do I run tests?"),
            chat(ChatRole::Assistant, "Use the test runner."),
            chat(ChatRole::User, "   "),
        ];
        let messages = build_agent_messages("Fix CI", &history);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[0].content.contains("Fix CI"));
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[2].role, MessageRole::Assistant);
    }
}
