use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::response::parse_structured_response;
use super::{ModelClient, StructuredRequest, StructuredResponse, TranscriptionRequest};
use crate::config::{Implementation, ResolvedModel};
use crate::error::ModelError;
use crate::sanitize::redact_url;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 4096;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY_LENGTH: usize = 500;

const RESPONSE_FORMAT_INSTRUCTIONS: &str = "Respond only with a JSON object of the form \
{\"sections\": [{\"filename\": \"...\", \"content\": \"...\", \"nextStep\": \"...\", \"category\": \"...\"}]}. \
Use one section per output file. `filename` is a short, descriptive name without extension. \
Omit `nextStep` unless routing options are listed.";

/// Model client for the OpenAI and Anthropic HTTP APIs.
pub struct HttpModelClient {
    client: reqwest::Client,
}

impl HttpModelClient {
    pub fn new() -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn openai_chat(
        &self,
        model: &ResolvedModel,
        request: &StructuredRequest,
    ) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", base_url(model, OPENAI_BASE_URL));
        let body = ChatRequest {
            model: &model.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_message(request),
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt.clone(),
                },
            ],
            temperature: request.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!(endpoint = %redact_url(&url), model = %model.model, "Sending chat completion");
        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(model.api_key.expose_secret())
            .json(&body);
        if let Some(organization) = &model.organization {
            builder = builder.header("OpenAI-Organization", organization);
        }

        let response = check_status(builder.send().await?).await?;
        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ModelError::EmptyResponse)
    }

    async fn anthropic_messages(
        &self,
        model: &ResolvedModel,
        request: &StructuredRequest,
    ) -> Result<String, ModelError> {
        let url = format!("{}/messages", base_url(model, ANTHROPIC_BASE_URL));
        let body = MessagesRequest {
            model: &model.model,
            max_tokens: MAX_OUTPUT_TOKENS,
            system: system_message(request),
            temperature: request.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt.clone(),
            }],
        };

        debug!(endpoint = %redact_url(&url), model = %model.model, "Sending messages request");
        let response = self
            .client
            .post(&url)
            .header("x-api-key", model.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let parsed: MessagesResponse = check_status(response).await?.json().await?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(text)
    }

    async fn openai_transcription(
        &self,
        model: &ResolvedModel,
        request: &TranscriptionRequest,
    ) -> Result<String, ModelError> {
        let url = format!("{}/audio/transcriptions", base_url(model, OPENAI_BASE_URL));

        let mut part = reqwest::multipart::Part::bytes(request.audio.clone())
            .file_name(request.filename.clone());
        if let Some(mime) = &request.mime_type {
            part = part.mime_str(mime)?;
        }
        let form = reqwest::multipart::Form::new()
            .text("model", model.model.clone())
            .part("file", part);

        debug!(
            endpoint = %redact_url(&url),
            model = %model.model,
            bytes = request.audio.len(),
            "Sending transcription request"
        );
        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(model.api_key.expose_secret())
            .multipart(form);
        if let Some(organization) = &model.organization {
            builder = builder.header("OpenAI-Organization", organization);
        }

        let parsed: TranscriptionResponse = check_status(builder.send().await?).await?.json().await?;
        if parsed.text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(parsed.text)
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn process_structured_request(
        &self,
        model: &ResolvedModel,
        request: &StructuredRequest,
    ) -> Result<StructuredResponse, ModelError> {
        let text = match model.implementation {
            Implementation::ChatGpt => self.openai_chat(model, request).await?,
            Implementation::Claude => self.anthropic_messages(model, request).await?,
            Implementation::Whisper => {
                return Err(ModelError::Unsupported(format!(
                    "model '{}' is a transcription model and cannot handle chat requests",
                    model.id
                )))
            }
        };
        parse_structured_response(&text)
    }

    async fn transcribe(
        &self,
        model: &ResolvedModel,
        request: &TranscriptionRequest,
    ) -> Result<String, ModelError> {
        match model.implementation {
            Implementation::Whisper => self.openai_transcription(model, request).await,
            other => Err(ModelError::Unsupported(format!(
                "{} models do not support transcription",
                other
            ))),
        }
    }
}

fn base_url<'a>(model: &'a ResolvedModel, default: &'a str) -> &'a str {
    model
        .base_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
}

fn system_message(request: &StructuredRequest) -> String {
    if request.system.trim().is_empty() {
        RESPONSE_FORMAT_INSTRUCTIONS.to_string()
    } else {
        format!("{}\n\n{}", request.system.trim_end(), RESPONSE_FORMAT_INSTRUCTIONS)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
    Err(ModelError::Api {
        status: status.as_u16(),
        message,
    })
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}
