use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use todo_core::agent::{LanguageModel, Message, ModelTurn, ToolCall, ToolDefinition};
use tracing::{debug, instrument};

pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-exp:free";
/// Environment variable holding the provider key.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Configuration for the OpenRouter-backed model.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct OpenRouterSettings {
    pub api_key: String,
    pub model: String,
    pub api_base: Option<String>,
    /// Sent as `X-Title` so the gateway can attribute traffic.
    pub app_title: Option<String>,
    /// Sent as `HTTP-Referer`.
    pub referer: Option<String>,
    pub timeout_secs: u64,
}

impl OpenRouterSettings {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            api_base: None,
            app_title: Some("Todo List Manager".to_string()),
            referer: Some("http://localhost:8000".to_string()),
            timeout_secs: 60,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.api_base
                .as_deref()
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
        )
    }
}

/// Chat-completions client for OpenRouter and other OpenAI-compatible gateways.
pub struct OpenRouterModel {
    client: Client,
    settings: OpenRouterSettings,
}

impl OpenRouterModel {
    pub fn new(settings: OpenRouterSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", settings.api_key))
                .context("api key is not a valid header value")?,
        );
        if let Some(referer) = &settings.referer {
            headers.insert("http-referer", HeaderValue::from_str(referer)?);
        }
        if let Some(title) = &settings.app_title {
            headers.insert("x-title", HeaderValue::from_str(title)?);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("building http client")?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &OpenRouterSettings {
        &self.settings
    }
}

#[async_trait]
impl LanguageModel for OpenRouterModel {
    fn name(&self) -> &str {
        "openrouter"
    }

    #[instrument(skip_all, fields(model = %self.settings.model, messages = messages.len()))]
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelTurn> {
        let mut payload = json!({
            "model": self.settings.model,
            "messages": messages.iter().map(WireMessage::from).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            payload["tools"] = json!(tools.iter().map(WireTool::from).collect::<Vec<_>>());
            payload["tool_choice"] = json!("auto");
        }

        let resp = self
            .client
            .post(self.settings.endpoint())
            .json(&payload)
            .send()
            .await
            .context("openrouter request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS {
                bail!("openrouter rate limit exceeded: {body}");
            }
            bail!("openrouter request failed with {status}: {body}");
        }

        let body: WireResponse = resp
            .json()
            .await
            .context("decoding openrouter response")?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .context("openrouter returned no choices")?;
        debug!(finish_reason = ?choice.finish_reason, "model turn received");
        Ok(turn_from_message(choice.message))
    }
}

fn turn_from_message(message: WireResponseMessage) -> ModelTurn {
    let calls = message.tool_calls.unwrap_or_default();
    if calls.is_empty() {
        let content = message
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        return ModelTurn::FinalAnswer(content);
    }
    ModelTurn::ToolInvocation(
        calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: parse_arguments(&call.function.arguments),
            })
            .collect(),
    )
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let plain = |role, content: &str| WireMessage {
            role,
            content: Some(content.to_string()),
            tool_call_id: None,
            tool_calls: None,
        };
        match message {
            Message::System { content } => plain("system", content),
            Message::User { content } => plain("user", content),
            Message::Assistant {
                content,
                tool_calls,
            } => WireMessage {
                role: "assistant",
                content: content.clone(),
                tool_call_id: None,
                tool_calls: (!tool_calls.is_empty())
                    .then(|| tool_calls.iter().map(WireToolCall::from).collect()),
            },
            Message::Tool {
                tool_call_id,
                content,
            } => WireMessage {
                role: "tool",
                content: Some(content.clone()),
                tool_call_id: Some(tool_call_id.clone()),
                tool_calls: None,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_type(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

impl<'a> From<&'a ToolDefinition> for WireTool<'a> {
    fn from(function: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}
