use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the conversation sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    /// Assistant turn; carries the tool calls the model asked for, if any.
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    /// Result of a single tool call, keyed by the provider's call id.
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: None,
            tool_calls: calls,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Structured arguments, normally a JSON object.
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Declaration of a callable tool: name, description and JSON schema for its parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Outcome of one dispatch round.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// The model is done. `None` when it produced no text.
    FinalAnswer(Option<String>),
    /// The model wants these tools run before it continues.
    ToolInvocation(Vec<ToolCall>),
}

/// Contract for any chat-completions provider (OpenRouter, scripted).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short name used for logging.
    fn name(&self) -> &str;

    /// Ask the model for its next move given the conversation so far.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelTurn>;
}

/// Model that replays a fixed script of turns and records every transcript
/// it was shown. Useful for tests and offline smoke checks.
#[derive(Debug, Default, Clone)]
pub struct ScriptedModel {
    turns: Arc<Mutex<VecDeque<ModelTurn>>>,
    transcripts: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl ScriptedModel {
    pub fn new(turns: impl IntoIterator<Item = ModelTurn>) -> Self {
        Self {
            turns: Arc::new(Mutex::new(turns.into_iter().collect())),
            transcripts: Arc::default(),
        }
    }

    /// Every message list passed to `complete`, in call order.
    pub fn transcripts(&self) -> Vec<Vec<Message>> {
        self.transcripts
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.transcripts.lock().map(|t| t.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ModelTurn> {
        self.transcripts
            .lock()
            .map_err(|err| anyhow!("transcript lock poisoned: {err}"))?
            .push(messages.to_vec());
        self.turns
            .lock()
            .map_err(|err| anyhow!("script lock poisoned: {err}"))?
            .pop_front()
            .ok_or_else(|| anyhow!("scripted model ran out of turns"))
    }
}
