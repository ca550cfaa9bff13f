use thiserror::Error;

use crate::tools::ToolError;

/// Failures that end a dispatch. Rendered to text only at the chat boundary.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model request failed: {0:#}")]
    Model(anyhow::Error),

    #[error("tool `{name}` failed: {source}")]
    Tool {
        name: String,
        #[source]
        source: ToolError,
    },

    #[error("model asked for unknown tool `{0}`")]
    UnknownTool(String),

    #[error("invalid arguments for tool `{name}`: {source}")]
    InvalidArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no final answer after {0} rounds")]
    RoundLimit(usize),
}
