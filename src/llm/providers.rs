use super::{ChatMessage, LLMConfig, LLMProvider, LLMResponse, LLM};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{ClosetError, Result};

const LMSTUDIO_ENDPOINT: &str = "http://localhost:1234/v1/chat/completions";
const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";

fn http_client(config: &LLMConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()?)
}

async fn ensure_success(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(ClosetError::Llm(format!("{} API error {}: {}", provider, status, text)))
}

/// OpenAI chat-completions wire format, served by OpenAI itself and by
/// local LMStudio instances
pub struct ChatCompletionsProvider {
    config: LLMConfig,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

impl ChatCompletionsProvider {
    pub fn new(config: LLMConfig) -> Result<Self> {
        let default_endpoint = match config.provider {
            LLMProvider::OpenAI => {
                if config.api_key.is_none() {
                    return Err(ClosetError::Llm("OpenAI API key required".into()));
                }
                OPENAI_ENDPOINT
            }
            _ => LMSTUDIO_ENDPOINT,
        };
        let endpoint = config.endpoint.clone().unwrap_or_else(|| default_endpoint.to_string());
        let client = http_client(&config)?;

        Ok(Self {
            config,
            endpoint,
            client,
        })
    }

    fn name(&self) -> &'static str {
        match self.config.provider {
            LLMProvider::OpenAI => "OpenAI",
            _ => "LMStudio",
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl LLM for ChatCompletionsProvider {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LLMResponse> {
        let request = ChatCompletionsRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!("Sending request to {} at {}", self.name(), self.endpoint);

        let response = self
            .authorized(self.client.post(&self.endpoint))
            .json(&request)
            .send()
            .await?;
        let body: ChatCompletionsResponse = ensure_success(self.name(), response).await?.json().await?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ClosetError::Llm(format!("No response from {}", self.name())))?;

        Ok(LLMResponse {
            content,
            tokens_used: body.usage.map(|u| u.total_tokens),
        })
    }

    fn provider_type(&self) -> LLMProvider {
        self.config.provider
    }
}

/// Gemini provider implementation
pub struct GeminiProvider {
    config: LLMConfig,
    api_base: Url,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "totalTokenCount")]
    total_token_count: u32,
}

impl GeminiProvider {
    pub fn new(config: LLMConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(ClosetError::Llm("Gemini API key required".into()));
        }

        let mut base = config.endpoint.clone().unwrap_or_else(|| GEMINI_API_BASE.to_string());
        if !base.ends_with('/') {
            base.push('/');
        }
        let api_base = Url::parse(&base)
            .map_err(|e| ClosetError::Config(format!("invalid Gemini endpoint {}: {}", base, e)))?;
        let client = http_client(&config)?;

        Ok(Self {
            config,
            api_base,
            client,
        })
    }

    /// `{base}/{path}?key={api_key}`
    fn url(&self, path: &str) -> Result<Url> {
        let mut url = self
            .api_base
            .join(path)
            .map_err(|e| ClosetError::Config(format!("invalid Gemini path {}: {}", path, e)))?;
        if let Some(key) = &self.config.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }

    fn generate_url(&self) -> Result<Url> {
        self.url(&format!("models/{}:generateContent", self.config.model))
    }
}

/// Split chat messages into Gemini's system instruction and conversation turns
fn to_gemini_contents(messages: Vec<ChatMessage>) -> (Option<GeminiContent>, Vec<GeminiContent>) {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for message in messages {
        let part = GeminiPart { text: message.content };
        match message.role.as_str() {
            "system" => system_parts.push(part),
            "assistant" => contents.push(GeminiContent {
                role: Some("model".to_string()),
                parts: vec![part],
            }),
            _ => contents.push(GeminiContent {
                role: Some("user".to_string()),
                parts: vec![part],
            }),
        }
    }

    let system = (!system_parts.is_empty()).then_some(GeminiContent {
        role: None,
        parts: system_parts,
    });
    (system, contents)
}

#[async_trait]
impl LLM for GeminiProvider {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LLMResponse> {
        let (system_instruction, contents) = to_gemini_contents(messages);
        let request = GeminiRequest {
            system_instruction,
            contents,
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
                response_mime_type: "application/json",
            },
        };

        debug!("Sending request to Gemini API ({})", self.config.model);

        let response = self.client.post(self.generate_url()?).json(&request).send().await?;
        let body: GeminiResponse = ensure_success("Gemini", response).await?.json().await?;

        let content = body
            .candidates
            .first()
            .map(|c| c.content.parts.iter().map(|p| p.text.as_str()).collect::<String>())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ClosetError::Llm("No response from Gemini".into()))?;

        Ok(LLMResponse {
            content,
            tokens_used: body.usage_metadata.map(|u| u.total_token_count),
        })
    }

    fn provider_type(&self) -> LLMProvider {
        LLMProvider::Gemini
    }
}
