use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use agentcart_core::config::{LlmConfig, LlmProvider};

use crate::tools::FunctionDeclaration;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// A structured action requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallRequest {
    pub call_id: String,
    pub name: String,
    pub args: Map<String, Value>,
}

impl FunctionCallRequest {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { call_id: call_id.into(), name: name.into(), args }
    }
}

/// One model response: free text or a batch of function calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AgentTurn {
    Text(String),
    Calls(Vec<FunctionCallRequest>),
}

impl AgentTurn {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn calls(&self) -> &[FunctionCallRequest] {
        match self {
            Self::Calls(calls) => calls,
            Self::Text(_) => &[],
        }
    }
}

/// Outcome of a satisfied function call, fed back to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub call_id: Option<String>,
    pub name: String,
    pub payload: Value,
}

impl FunctionResult {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self { call_id: None, name: name.into(), payload }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConversationEntry {
    User(String),
    FunctionResults(Vec<FunctionResult>),
    Model(AgentTurn),
}

/// Everything a backend needs to produce the next turn.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnRequest {
    pub system_instruction: String,
    pub functions: Vec<FunctionDeclaration>,
    pub history: Vec<ConversationEntry>,
}

impl TurnRequest {
    pub fn last_entry(&self) -> Option<&ConversationEntry> {
        self.history.last()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("agent backend transport failure: {0}")]
    Transport(String),
    #[error("agent backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("agent backend returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("agent backend misconfigured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait AgentBackend: Send + Sync {
    async fn send_turn(&self, request: &TurnRequest) -> Result<AgentTurn, BackendError>;
}

/// Chat-completions client for OpenAI and Ollama's OpenAI-compatible endpoint.
pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| BackendError::Configuration(error.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BackendError> {
        let base_url = match (config.provider, config.base_url.as_deref()) {
            (_, Some(url)) => url.to_string(),
            (LlmProvider::OpenAi, None) => OPENAI_BASE_URL.to_string(),
            (LlmProvider::Ollama, None) => {
                return Err(BackendError::Configuration(
                    "ollama provider needs llm.base_url".to_string(),
                ))
            }
        };
        Self::new(
            &base_url,
            config.api_key.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AgentBackend for OpenAiCompatibleBackend {
    async fn send_turn(&self, request: &TurnRequest) -> Result<AgentTurn, BackendError> {
        let body = build_chat_body(&self.model, request);
        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key.expose_secret());
        }

        let response =
            http.send().await.map_err(|error| BackendError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status: status.as_u16(), body });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|error| BackendError::InvalidResponse(error.to_string()))?;
        parse_chat_response(&payload)
    }
}

/// Renders the conversation as a chat-completions request body.
///
/// Every assistant tool call must be answered by a `tool` message before the
/// next user message, so calls the runtime handled without sending a result
/// (cart mutations) get a synthetic acknowledgement.
pub fn build_chat_body(model: &str, request: &TurnRequest) -> Value {
    let mut messages = vec![json!({ "role": "system", "content": request.system_instruction })];
    let mut unanswered: VecDeque<(String, String)> = VecDeque::new();

    for entry in &request.history {
        match entry {
            ConversationEntry::User(text) => {
                acknowledge_pending(&mut messages, &mut unanswered);
                messages.push(json!({ "role": "user", "content": text }));
            }
            ConversationEntry::Model(AgentTurn::Text(text)) => {
                acknowledge_pending(&mut messages, &mut unanswered);
                messages.push(json!({ "role": "assistant", "content": text }));
            }
            ConversationEntry::Model(AgentTurn::Calls(calls)) => {
                acknowledge_pending(&mut messages, &mut unanswered);
                let tool_calls: Vec<Value> = calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.call_id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": Value::Object(call.args.clone()).to_string(),
                            }
                        })
                    })
                    .collect();
                unanswered.extend(calls.iter().map(|call| (call.call_id.clone(), call.name.clone())));
                messages.push(json!({ "role": "assistant", "content": null, "tool_calls": tool_calls }));
            }
            ConversationEntry::FunctionResults(results) => {
                for result in results {
                    let call_id = result
                        .call_id
                        .clone()
                        .or_else(|| {
                            unanswered
                                .iter()
                                .find(|(_, name)| name == &result.name)
                                .map(|(id, _)| id.clone())
                        })
                        .unwrap_or_else(|| result.name.clone());
                    unanswered.retain(|(id, _)| id != &call_id);
                    messages.push(json!({
                        "role": "tool",
                        "tool_call_id": call_id,
                        "content": result.payload.to_string(),
                    }));
                }
                acknowledge_pending(&mut messages, &mut unanswered);
            }
        }
    }

    let tools: Vec<Value> = request
        .functions
        .iter()
        .map(|function| {
            json!({
                "type": "function",
                "function": {
                    "name": function.name,
                    "description": function.description,
                    "parameters": function.parameters,
                }
            })
        })
        .collect();

    let mut body = json!({ "model": model, "messages": messages, "temperature": 0.2 });
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools);
    }
    body
}

fn acknowledge_pending(messages: &mut Vec<Value>, unanswered: &mut VecDeque<(String, String)>) {
    while let Some((call_id, _)) = unanswered.pop_front() {
        messages.push(json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": json!({ "status": "applied" }).to_string(),
        }));
    }
}

/// Extracts the next turn from a chat-completions response body.
pub fn parse_chat_response(payload: &Value) -> Result<AgentTurn, BackendError> {
    let message = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| BackendError::InvalidResponse("response has no choices".to_string()))?;

    let tool_calls = message.get("tool_calls").and_then(Value::as_array);
    if let Some(tool_calls) = tool_calls.filter(|calls| !calls.is_empty()) {
        let mut calls = Vec::with_capacity(tool_calls.len());
        for (index, tool_call) in tool_calls.iter().enumerate() {
            let function = tool_call.get("function");
            let Some(name) = function.and_then(|f| f.get("name")).and_then(Value::as_str) else {
                warn!(event_name = "agent.tool_call_without_name", index, "skipping tool call");
                continue;
            };
            let call_id = tool_call
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{index}"));
            let args = match function.and_then(|f| f.get("arguments")) {
                Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_else(|error| {
                    debug!(
                        event_name = "agent.tool_arguments_unparseable",
                        tool = name,
                        error = %error,
                        "treating arguments as empty"
                    );
                    Value::Null
                }),
                Some(other) => other.clone(),
                None => Value::Null,
            };
            calls.push(FunctionCallRequest::new(call_id, name, args));
        }
        return Ok(AgentTurn::Calls(calls));
    }

    let text = message.get("content").and_then(Value::as_str).unwrap_or_default();
    Ok(AgentTurn::Text(text.to_string()))
}
