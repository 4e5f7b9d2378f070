//! OpenAI-compatible chat completions client.
//!
//! Works against OpenAI itself and against Ollama's `/v1` compatibility
//! layer. Tool schemas are declared as `function` tools; a reply carrying
//! `tool_calls` becomes [`ReasoningOutcome::InvokeTools`], anything else with
//! text becomes a final answer.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use waypoint_agent::reasoning::{
    ReasoningEngine, ReasoningError, ReasoningOutcome, ReasoningRequest,
};
use waypoint_core::config::{LlmConfig, LlmProvider};
use waypoint_core::domain::query::TurnRole;
use waypoint_core::domain::tool::{ToolCall, ToolFilter};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

const CLOSING_INSTRUCTION: &str =
    "The tool budget for this question is spent. Answer now from the results above.";

pub struct OpenAiCompatibleEngine {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatibleEngine {
    pub fn from_config(config: &LlmConfig) -> Result<Self, reqwest::Error> {
        let http =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http,
            base_url,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Lists models to confirm the endpoint answers and the key is accepted.
    pub async fn ping(&self) -> Result<(), ReasoningError> {
        let mut request = self.http.get(format!("{}/v1/models", self.base_url));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }
        let response =
            request.send().await.map_err(|error| ReasoningError::Unreachable(error.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            Err(ReasoningError::Unreachable(format!("model listing returned {status}")))
        }
    }

    fn request_body(&self, request: &ReasoningRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": chat_messages(request),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        });
        if request.allow_tools && !request.tools.is_empty() {
            let tools = request
                .tools
                .iter()
                .map(|schema| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": schema.operation,
                            "description": schema.description,
                            "parameters": schema.parameters,
                        }
                    })
                })
                .collect::<Vec<_>>();
            body["tools"] = Value::Array(tools);
        }
        body
    }
}

#[async_trait]
impl ReasoningEngine for OpenAiCompatibleEngine {
    async fn reason(
        &self,
        request: &ReasoningRequest,
    ) -> Result<ReasoningOutcome, ReasoningError> {
        let mut call = self.http.post(self.endpoint()).json(&self.request_body(request));
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key.expose_secret());
        }

        let response =
            call.send().await.map_err(|error| ReasoningError::Unreachable(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                event_name = "llm.request.rejected",
                status = status.as_u16(),
                model = %self.model,
                "chat completion failed"
            );
            return Err(ReasoningError::Unreachable(format!("{status}: {}", truncate(&detail))));
        }

        let completion = response
            .json::<ChatCompletion>()
            .await
            .map_err(|error| ReasoningError::MalformedOutput(error.to_string()))?;
        let outcome = parse_completion(completion)?;
        debug!(
            event_name = "llm.request.completed",
            model = %self.model,
            tool_calls = match &outcome {
                ReasoningOutcome::InvokeTools(calls) => calls.len(),
                ReasoningOutcome::FinalAnswer(_) => 0,
            },
            "chat completion received"
        );
        Ok(outcome)
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => OPENAI_BASE_URL,
        LlmProvider::Ollama => OLLAMA_BASE_URL,
    }
}

/// System prompt, prior turns, the question, then each tool round as an
/// assistant `tool_calls` message followed by one `tool` message per result.
fn chat_messages(request: &ReasoningRequest) -> Vec<Value> {
    let mut system = request.system_prompt.clone();
    if !request.allow_tools {
        system.push_str("\n\n");
        system.push_str(CLOSING_INSTRUCTION);
    }

    let mut messages = vec![json!({"role": "system", "content": system})];
    for turn in &request.context {
        let role = match turn.role {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        };
        messages.push(json!({"role": role, "content": turn.content}));
    }
    messages.push(json!({"role": "user", "content": request.query_text}));

    for (round, exchanges) in request.rounds.iter().enumerate() {
        let ids =
            (0..exchanges.len()).map(|index| format!("call_{round}_{index}")).collect::<Vec<_>>();
        let tool_calls = exchanges
            .iter()
            .zip(&ids)
            .map(|(exchange, id)| {
                let arguments = json!({
                    "service": exchange.call.service,
                    "region": exchange.call.region,
                    "filters": exchange.call.filters,
                });
                json!({
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": exchange.call.operation,
                        "arguments": arguments.to_string(),
                    }
                })
            })
            .collect::<Vec<_>>();
        messages.push(json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": tool_calls,
        }));

        for (exchange, id) in exchanges.iter().zip(&ids) {
            let content = serde_json::to_string(&exchange.result).unwrap_or_default();
            messages.push(json!({"role": "tool", "tool_call_id": id, "content": content}));
        }
    }
    messages
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    /// OpenAI sends a JSON string; Ollama may send the object itself.
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Default, Deserialize)]
struct ToolArguments {
    #[serde(default)]
    service: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    filters: Vec<ToolFilter>,
}

fn parse_completion(completion: ChatCompletion) -> Result<ReasoningOutcome, ReasoningError> {
    let Some(choice) = completion.choices.into_iter().next() else {
        return Err(ReasoningError::MalformedOutput("completion had no choices".to_string()));
    };
    let message = choice.message;

    if !message.tool_calls.is_empty() {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|call| tool_call(call.function))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(ReasoningOutcome::InvokeTools(calls));
    }

    match message.content.map(|content| content.trim().to_string()) {
        Some(content) if !content.is_empty() => Ok(ReasoningOutcome::FinalAnswer(content)),
        _ => Err(ReasoningError::MalformedOutput(
            "completion had neither text nor tool calls".to_string(),
        )),
    }
}

fn tool_call(function: WireFunction) -> Result<ToolCall, ReasoningError> {
    let arguments = match function.arguments {
        Value::String(raw) if raw.trim().is_empty() => Ok(ToolArguments::default()),
        Value::String(raw) => serde_json::from_str::<ToolArguments>(&raw),
        Value::Null => Ok(ToolArguments::default()),
        other => serde_json::from_value::<ToolArguments>(other),
    }
    .map_err(|error| {
        ReasoningError::MalformedOutput(format!(
            "arguments for `{}` did not parse: {error}",
            function.name
        ))
    })?;

    Ok(ToolCall {
        service: arguments.service,
        operation: function.name,
        region: arguments.region.filter(|region| !region.trim().is_empty()),
        filters: arguments.filters,
    })
}

fn truncate(text: &str) -> String {
    text.chars().take(200).collect()
}
