use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::Config,
    error::{AppError, Result},
};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_MODEL: &str = "gemini-1.5-flash";
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    OpenAi,
}

impl Provider {
    pub fn name(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
        }
    }

    fn parse(name: &str) -> Option<Provider> {
        match name {
            "gemini" => Some(Provider::Gemini),
            "openai" => Some(Provider::OpenAi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Thin wrapper around the configured text-generation providers. The
/// providers are opaque: prompts go out, text comes back, and any failure
/// surfaces as `Unavailable`.
#[derive(Clone)]
pub struct AiService {
    client: reqwest::Client,
    openai_api_key: Option<String>,
    gemini_api_key: Option<String>,
    provider: Arc<RwLock<Provider>>,
}

impl AiService {
    pub fn from_config(config: &Config) -> Self {
        let provider = Provider::parse(&config.ai_provider).unwrap_or(Provider::Gemini);
        Self {
            client: reqwest::Client::new(),
            openai_api_key: config.openai_api_key.clone(),
            gemini_api_key: config.gemini_api_key.clone(),
            provider: Arc::new(RwLock::new(provider)),
        }
    }

    pub fn current_provider(&self) -> Provider {
        *self.provider.read().expect("provider lock poisoned")
    }

    pub fn available(&self) -> Vec<&'static str> {
        let mut services = Vec::new();
        if self.gemini_api_key.is_some() {
            services.push("gemini");
        }
        if self.openai_api_key.is_some() {
            services.push("openai");
        }
        services
    }

    pub fn configured(&self) -> bool {
        !self.available().is_empty()
    }

    pub fn set_provider(&self, name: &str) -> Result<&'static str> {
        let provider = Provider::parse(name).ok_or_else(|| {
            AppError::BadRequest(format!("Unsupported AI provider: {name}"))
        })?;

        if !self.available().contains(&provider.name()) {
            return Err(AppError::BadRequest(format!(
                "Provider {name} is not available. Available providers: {}",
                self.available().join(", ")
            )));
        }

        *self.provider.write().expect("provider lock poisoned") = provider;
        Ok(provider.name())
    }

    pub async fn generate_content(
        &self,
        prompt: &str,
        system_message: Option<&str>,
    ) -> Result<String> {
        match self.current_provider() {
            Provider::Gemini => {
                // Gemini takes one prompt; fold the system message in.
                let full_prompt = match system_message {
                    Some(system) => format!("{system}\n\n{prompt}"),
                    None => prompt.to_string(),
                };
                self.generate_with_gemini(&full_prompt).await
            }
            Provider::OpenAi => {
                let mut messages = Vec::new();
                if let Some(system) = system_message {
                    messages.push(ChatMessage {
                        role: "system".to_string(),
                        content: system.to_string(),
                    });
                }
                messages.push(ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                });
                self.chat_with_openai(&messages).await
            }
        }
    }

    pub async fn chat_completion(&self, messages: &[ChatMessage]) -> Result<String> {
        match self.current_provider() {
            Provider::Gemini => {
                // Flatten the conversation into a transcript.
                let conversation = messages
                    .iter()
                    .map(|msg| match msg.role.as_str() {
                        "system" => format!("System: {}", msg.content),
                        "user" => format!("User: {}", msg.content),
                        "assistant" => format!("Assistant: {}", msg.content),
                        _ => msg.content.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n");
                self.generate_with_gemini(&conversation).await
            }
            Provider::OpenAi => self.chat_with_openai(messages).await,
        }
    }

    async fn generate_with_gemini(&self, prompt: &str) -> Result<String> {
        let api_key = self.gemini_api_key.as_deref().ok_or_else(|| {
            AppError::Unavailable("Gemini API key is not configured".to_string())
        })?;

        let url =
            format!("{GEMINI_API_BASE}/models/{GEMINI_MODEL}:generateContent?key={api_key}");
        let resp = self
            .client
            .post(&url)
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Gemini API error: {e}");
                AppError::Unavailable("Failed to generate content with Gemini API".to_string())
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            tracing::error!("Gemini API returned HTTP {status}");
            return Err(AppError::Unavailable(
                "Failed to generate content with Gemini API".to_string(),
            ));
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| {
            AppError::Unavailable(format!("Failed to parse Gemini response: {e}"))
        })?;

        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::Unavailable("Gemini response contained no text".to_string())
            })
    }

    async fn chat_with_openai(&self, messages: &[ChatMessage]) -> Result<String> {
        let api_key = self.openai_api_key.as_deref().ok_or_else(|| {
            AppError::Unavailable("OpenAI API key is not configured".to_string())
        })?;

        let resp = self
            .client
            .post(OPENAI_CHAT_URL)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&json!({
                "model": OPENAI_MODEL,
                "messages": messages,
                "max_tokens": 4000,
                "temperature": 0.7,
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("OpenAI API error: {e}");
                AppError::Unavailable("Failed to complete chat with OpenAI API".to_string())
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            tracing::error!("OpenAI API returned HTTP {status}");
            return Err(AppError::Unavailable(
                "Failed to complete chat with OpenAI API".to_string(),
            ));
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| {
            AppError::Unavailable(format!("Failed to parse OpenAI response: {e}"))
        })?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::Unavailable("OpenAI response contained no text".to_string())
            })
    }
}
