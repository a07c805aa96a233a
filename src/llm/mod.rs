pub mod providers;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// LLM provider types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LLMProvider {
    /// Local OpenAI-compatible server
    LMStudio,
    Gemini,
    OpenAI,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    /// Overrides the provider's default API base
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Gemini,
            endpoint: None,
            api_key: None,
            model: "gemini-2.5-pro".to_string(),
            max_tokens: 8192,
            temperature: 0.1,
            timeout_seconds: 120,
        }
    }
}

/// Chat message for LLM communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// LLM response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// Trait for LLM providers
#[async_trait]
pub trait LLM: Send + Sync {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LLMResponse>;
    fn provider_type(&self) -> LLMProvider;
}

/// Create LLM instance based on configuration
pub fn create_llm(config: &LLMConfig) -> Result<Box<dyn LLM>> {
    match config.provider {
        LLMProvider::LMStudio | LLMProvider::OpenAI => {
            Ok(Box::new(providers::ChatCompletionsProvider::new(config.clone())?))
        }
        LLMProvider::Gemini => Ok(Box::new(providers::GeminiProvider::new(config.clone())?)),
    }
}

/// Strip markdown code fences and surrounding whitespace from a model reply
pub fn clean_llm_response(content: &str) -> &str {
    let content = content.trim();

    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    // Drop the info string (```json) along with the opening fence line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_fenced_json() {
        let reply = "```json\n{\"guest\": \"Barry Jenkins\"}\n```\n";
        assert_eq!(clean_llm_response(reply), "{\"guest\": \"Barry Jenkins\"}");
    }

    #[test]
    fn test_clean_plain_reply() {
        assert_eq!(clean_llm_response("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(clean_llm_response("```\n[]\n```"), "[]");
    }

    #[test]
    fn test_default_provider_needs_key() {
        let config = LLMConfig::default();
        assert_eq!(config.provider, LLMProvider::Gemini);
        assert!(create_llm(&config).is_err());
    }

    #[test]
    fn test_local_provider_needs_no_key() {
        let config = LLMConfig {
            provider: LLMProvider::LMStudio,
            model: "local-model".to_string(),
            ..LLMConfig::default()
        };
        let llm = create_llm(&config).unwrap();
        assert_eq!(llm.provider_type(), LLMProvider::LMStudio);
    }
}
