//! Message and History domain types.
//!
//! These are the value objects that flow through one orchestration run:
//! caller builds a history → endpoint replies with an assistant message →
//! dispatcher answers requested tool calls with tool messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    User,
    /// The language model
    Assistant,
    /// Tool execution result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content; assistant turns that only request tools may carry none
    #[serde(default)]
    pub content: Option<String>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, Some(content.into()))
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, Some(content.into()))
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Whether this message asks for at least one tool invocation.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// The text content, or `""` when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// A tool call embedded in an assistant message.
///
/// Created by the completion endpoint, consumed exactly once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque ID for this tool call, echoed back in the tool result
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as raw JSON text
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Ordered, append-only log of the turns exchanged with the model.
///
/// Owned by a single orchestration run. A tool message is only accepted when
/// it answers a still-unanswered tool call of the nearest preceding assistant
/// message. Deserialization applies the same checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Message>", into = "Vec<Message>")]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// The usual opening: an optional system prompt, then one user message.
    /// A blank prompt is skipped.
    pub fn conversation(system_prompt: Option<&str>, user_message: impl Into<String>) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
            messages.push(Message::system(prompt));
        }
        messages.push(Message::user(user_message));
        Self { messages }
    }

    /// Build a history from existing messages, validating every tool turn.
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Result<Self> {
        let mut history = Self::new();
        for message in messages {
            history.push(message)?;
        }
        Ok(history)
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) -> Result<()> {
        if message.role == Role::Tool {
            self.check_tool_reply(&message)?;
        }
        self.messages.push(message);
        Ok(())
    }

    fn check_tool_reply(&self, message: &Message) -> Result<()> {
        let call_id = message.tool_call_id.as_deref().ok_or_else(|| {
            Error::InvalidHistory("tool message without tool_call_id".into())
        })?;

        let answered = self
            .messages
            .iter()
            .rev()
            .take_while(|m| m.role == Role::Tool)
            .any(|m| m.tool_call_id.as_deref() == Some(call_id));
        if answered {
            return Err(Error::InvalidHistory(format!(
                "tool_call_id '{call_id}' has already been answered"
            )));
        }

        let requester = self.messages.iter().rev().find(|m| m.role != Role::Tool);
        match requester {
            Some(m) if m.role == Role::Assistant => {
                if m.tool_calls.iter().any(|tc| tc.id == call_id) {
                    Ok(())
                } else {
                    Err(Error::InvalidHistory(format!(
                        "tool_call_id '{call_id}' was not requested by the preceding assistant message"
                    )))
                }
            }
            _ => Err(Error::InvalidHistory(format!(
                "tool message '{call_id}' does not follow an assistant message"
            ))),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl TryFrom<Vec<Message>> for History {
    type Error = Error;

    fn try_from(messages: Vec<Message>) -> Result<Self> {
        Self::from_messages(messages)
    }
}

impl From<History> for Vec<Message> {
    fn from(history: History) -> Self {
        history.messages
    }
}
