use std::sync::Arc;

use todo_core::agent::{LanguageModel, Message, ModelTurn, ToolDefinition};
use tracing::{debug, info, instrument, warn};

use crate::{error::AgentError, rate_limit::RateLimiter, tools::Toolbox};

pub const AGENT_NAME: &str = "Assistant";
pub const SYSTEM_PROMPT: &str = "You are a helpful Assistant that manages Todos list.";
/// Returned when the model finishes without any text.
pub const NO_OUTPUT: &str = "Task completed but no output was returned";
pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// Configuration for one instruction: built fresh, used once, dropped.
pub struct AgentSession<'a> {
    pub name: &'static str,
    pub instructions: &'static str,
    pub tools: Vec<ToolDefinition>,
    model: &'a dyn LanguageModel,
    toolbox: &'a dyn Toolbox,
    max_rounds: usize,
}

impl AgentSession<'_> {
    /// Let the model alternate between tool calls and a final answer.
    async fn run(&self, instruction: &str) -> Result<Option<String>, AgentError> {
        let mut messages = vec![Message::system(self.instructions), Message::user(instruction)];

        for round in 1..=self.max_rounds {
            let turn = self
                .model
                .complete(&messages, &self.tools)
                .await
                .map_err(AgentError::Model)?;

            let calls = match turn {
                ModelTurn::FinalAnswer(text) => {
                    debug!(round, "model produced final answer");
                    return Ok(text);
                }
                ModelTurn::ToolInvocation(calls) if calls.is_empty() => return Ok(None),
                ModelTurn::ToolInvocation(calls) => calls,
            };

            messages.push(Message::tool_calls(calls.clone()));
            for call in &calls {
                debug!(round, tool = %call.name, "invoking tool");
                let output = self.toolbox.invoke(call).await?;
                let content = match output {
                    serde_json::Value::String(text) => text,
                    other => other.to_string(),
                };
                messages.push(Message::tool_result(&call.id, content));
            }
        }

        Err(AgentError::RoundLimit(self.max_rounds))
    }
}

/// Runs instructions through the model under the shared rate limit.
#[derive(Clone)]
pub struct Dispatcher {
    limiter: Arc<RateLimiter>,
    model: Arc<dyn LanguageModel>,
    toolbox: Arc<dyn Toolbox>,
    max_rounds: usize,
}

impl Dispatcher {
    pub fn new(
        limiter: Arc<RateLimiter>,
        model: Arc<dyn LanguageModel>,
        toolbox: Arc<dyn Toolbox>,
    ) -> Self {
        Self {
            limiter,
            model,
            toolbox,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn session(&self) -> AgentSession<'_> {
        AgentSession {
            name: AGENT_NAME,
            instructions: SYSTEM_PROMPT,
            tools: self.toolbox.definitions(),
            model: self.model.as_ref(),
            toolbox: self.toolbox.as_ref(),
            max_rounds: self.max_rounds,
        }
    }

    /// Structured variant of [`Dispatcher::dispatch`]. `Ok(None)` means the
    /// model finished without text.
    #[instrument(skip(self, instruction), fields(model = self.model.name()))]
    pub async fn try_dispatch(&self, instruction: &str) -> Result<Option<String>, AgentError> {
        self.limiter.acquire().await;
        let session = self.session();
        info!(agent = session.name, tools = session.tools.len(), "dispatching instruction");
        session.run(instruction).await
    }

    /// Run one instruction and always come back with text.
    pub async fn dispatch(&self, instruction: &str) -> String {
        match self.try_dispatch(instruction).await {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => NO_OUTPUT.to_string(),
            Err(err) => {
                warn!(error = %err, "dispatch failed");
                format!("Error processing request: {err}")
            }
        }
    }
}
