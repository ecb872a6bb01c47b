//! Gemini `generateContent` back-end.

use crate::agent::backend::{GenerateRequest, ModelBackend, ModelTurn};
use crate::agent::tools::ToolDefinition;
use crate::config::ModelConfig;
use crate::error::BackendError;
use crate::models::{Conversation, Payload, Role, ToolCall};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// Talks to the Gemini REST API.
pub struct GeminiBackend {
    client: reqwest::Client,
    config: ModelConfig,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(config: ModelConfig, api_key: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| BackendError::Http(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.name
        )
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn model_name(&self) -> &str {
        &self.config.name
    }

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<ModelTurn, BackendError> {
        let body = build_request(&request, self.config.temperature);
        debug!(
            "Sending generateContent with {} content(s)",
            body.contents.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Http(format!(
                        "request timed out after {}s",
                        self.config.timeout_seconds
                    ))
                } else if e.is_connect() {
                    BackendError::Http(format!("cannot connect to {}", self.config.base_url))
                } else {
                    BackendError::Http(format!("failed to send request: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, body));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("failed to parse response: {}", e)))?;

        parse_response(parsed)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCallPart,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponsePart,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FunctionCallPart {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct FunctionResponsePart {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartResponse {
    text: Option<String>,
    function_call: Option<FunctionCallPart>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn build_request(request: &GenerateRequest<'_>, temperature: f32) -> GenerateContentRequest {
    let function_declarations: Vec<FunctionDeclaration> =
        request.tools.iter().map(declaration).collect();

    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part::Text {
                text: request.system_instruction.to_string(),
            }],
        },
        contents: build_contents(request.conversation),
        tools: if function_declarations.is_empty() {
            Vec::new()
        } else {
            vec![ToolDeclarations {
                function_declarations,
            }]
        },
        generation_config: GenerationConfig { temperature },
    }
}

fn declaration(tool: &ToolDefinition) -> FunctionDeclaration {
    FunctionDeclaration {
        name: tool.function.name.clone(),
        description: tool.function.description.clone(),
        parameters: tool.function.parameters.clone(),
    }
}

/// Map the conversation onto Gemini contents.
///
/// Gemini has no tool role: results go back as `user` content holding
/// `functionResponse` parts, with the results of one round grouped
/// into a single content.
fn build_contents(conversation: &Conversation) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::new();

    for turn in conversation.turns() {
        let part = match &turn.payload {
            Payload::Text { text } => vec![Part::Text { text: text.clone() }],
            Payload::ToolCalls { text, calls } => {
                let mut parts = Vec::with_capacity(calls.len() + 1);
                if !text.is_empty() {
                    parts.push(Part::Text { text: text.clone() });
                }
                parts.extend(calls.iter().map(|call| Part::FunctionCall {
                    function_call: FunctionCallPart {
                        name: call.name.clone(),
                        args: call.args.clone(),
                    },
                }));
                parts
            }
            Payload::ToolResult { name, result } => vec![Part::FunctionResponse {
                function_response: FunctionResponsePart {
                    name: name.clone(),
                    response: json!({ "result": result }),
                },
            }],
        };

        if turn.role == Role::Tool {
            if let Some(last) = contents.last_mut() {
                let previous_is_result = matches!(
                    last.parts.last(),
                    Some(Part::FunctionResponse { .. })
                );
                if previous_is_result {
                    last.parts.extend(part);
                    continue;
                }
            }
        }

        let role = match turn.role {
            Role::Model => "model",
            Role::User | Role::Tool => "user",
        };
        contents.push(Content {
            role: Some(role),
            parts: part,
        });
    }

    contents
}

fn parse_response(response: GenerateContentResponse) -> Result<ModelTurn, BackendError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(BackendError::InvalidResponse(format!(
            "empty response: {}",
            reason
        )));
    };

    let Some(content) = candidate.content else {
        return Err(BackendError::InvalidResponse(format!(
            "candidate has no content (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    };

    let mut turn = ModelTurn::default();
    for part in content.parts {
        if let Some(text) = part.text {
            turn.text.push_str(&text);
        }
        if let Some(call) = part.function_call {
            turn.tool_calls.push(ToolCall {
                name: call.name,
                args: call.args,
            });
        }
    }
    Ok(turn)
}

fn map_http_error(status: StatusCode, body: String) -> BackendError {
    let (status_text, message) = match serde_json::from_str::<ErrorWrapper>(&body) {
        Ok(wrapper) => (
            wrapper.error.status.unwrap_or_default(),
            wrapper.error.message.unwrap_or_else(|| body.clone()),
        ),
        Err(_) => (String::new(), body.clone()),
    };

    if status == StatusCode::TOO_MANY_REQUESTS || status_text == "RESOURCE_EXHAUSTED" {
        return BackendError::RateLimited(message);
    }

    BackendError::Api {
        status: status.as_u16(),
        body: if status_text.is_empty() {
            message
        } else {
            format!("{}: {}", status_text, message)
        },
    }
}
