//! Message types for LLM communication
//!
//! Provider-neutral conversation messages. Tool use is expressed as content
//! blocks: the assistant emits `ToolUse` blocks and the next user message
//! answers them with `ToolResult` blocks carrying the same id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role in a conversation
///
/// The system prompt travels separately in
/// [`CompletionRequest::system`](crate::CompletionRequest::system).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Content block in a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },

    /// Tool use request from assistant
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },

    /// Tool result from user
    ToolResult {
        /// Id of the `ToolUse` block being answered
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// Message content: either simple text or structured blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    pub fn into_blocks(self) -> Vec<ContentBlock> {
        match self {
            MessageContent::Text(text) => vec![ContentBlock::Text { text }],
            MessageContent::Blocks(blocks) => blocks,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// All text content, concatenated
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Tool use blocks, in order
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        match &self.content {
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
                .collect(),
            MessageContent::Text(_) => vec![],
        }
    }

    pub fn has_tool_uses(&self) -> bool {
        !self.tool_uses().is_empty()
    }

    /// Append another message's content, which must have the same role
    pub fn absorb(&mut self, other: Message) {
        let mut blocks = std::mem::replace(&mut self.content, MessageContent::Blocks(Vec::new()))
            .into_blocks();
        blocks.extend(other.content.into_blocks());
        self.content = MessageContent::Blocks(blocks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_concatenates_blocks() {
        let msg = Message::blocks(
            Role::Assistant,
            vec![
                ContentBlock::Text { text: "Let me ".into() },
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "lookup".into(),
                    input: json!({}),
                },
                ContentBlock::Text { text: "check.".into() },
            ],
        );
        assert_eq!(msg.text(), "Let me check.");
        assert!(msg.has_tool_uses());
        assert!(!Message::user("hi").has_tool_uses());
    }

    #[test]
    fn test_absorb_merges_into_blocks() {
        let mut msg = Message::user("first");
        msg.absorb(Message::blocks(
            Role::User,
            vec![ContentBlock::ToolResult {
                tool_use_id: "t1".into(),
                content: "ok".into(),
                is_error: None,
            }],
        ));
        match &msg.content {
            MessageContent::Blocks(blocks) => assert_eq!(blocks.len(), 2),
            MessageContent::Text(_) => panic!("expected blocks"),
        }
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(Message::blocks(
            Role::User,
            vec![ContentBlock::ToolResult {
                tool_use_id: "t1".into(),
                content: "boom".into(),
                is_error: Some(true),
            }],
        ))
        .unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "tool_result");
        assert_eq!(json["content"][0]["is_error"], true);
    }
}
