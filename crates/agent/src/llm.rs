use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use menuguard_core::config::{LlmConfig, LlmProvider};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Talks to Ollama's `/api/generate` or any server exposing
/// `/v1/chat/completions`.
pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .map(|url| url.trim().trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("llm.base_url is not configured"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build llm http client")?;

        Ok(Self {
            client,
            provider: config.provider,
            base_url: base_url.to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::Ollama => format!("{}/api/generate", self.base_url),
            LlmProvider::OpenAiCompatible if self.base_url.ends_with("/v1") => {
                format!("{}/chat/completions", self.base_url)
            }
            LlmProvider::OpenAiCompatible => format!("{}/v1/chat/completions", self.base_url),
        }
    }

    async fn complete_ollama(&self, prompt: &str) -> Result<String> {
        let request = OllamaGenerateRequest { model: &self.model, prompt, stream: false };
        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .context("failed to reach ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("ollama returned {status}: {body}"));
        }

        let payload: OllamaGenerateResponse =
            response.json().await.context("failed to parse ollama response")?;
        Ok(payload.response)
    }

    async fn complete_chat(&self, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };
        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await.context("failed to reach chat completion endpoint")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("chat completion endpoint returned {status}: {body}"));
        }

        let payload: ChatCompletionResponse =
            response.json().await.context("failed to parse chat completion response")?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion response had no content"))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.provider {
            LlmProvider::Ollama => self.complete_ollama(prompt).await,
            LlmProvider::OpenAiCompatible => self.complete_chat(prompt).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use menuguard_core::config::{AppConfig, LlmProvider};

    use super::HttpLlmClient;

    #[test]
    fn endpoint_follows_provider() {
        let mut config = AppConfig::default().llm;
        let ollama = HttpLlmClient::from_config(&config).expect("client");
        assert_eq!(ollama.endpoint(), "http://localhost:11434/api/generate");

        config.provider = LlmProvider::OpenAiCompatible;
        config.base_url = Some("https://llm.example.test/".to_string());
        let chat = HttpLlmClient::from_config(&config).expect("client");
        assert_eq!(chat.endpoint(), "https://llm.example.test/v1/chat/completions");

        config.base_url = Some("https://llm.example.test/v1".to_string());
        let versioned = HttpLlmClient::from_config(&config).expect("client");
        assert_eq!(versioned.endpoint(), "https://llm.example.test/v1/chat/completions");
    }

    #[test]
    fn missing_base_url_is_rejected() {
        let mut config = AppConfig::default().llm;
        config.base_url = None;
        assert!(HttpLlmClient::from_config(&config).is_err());
    }
}
