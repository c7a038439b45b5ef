use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{GenerationProvider, GenerationSettings};
use crate::error::{RagError, Result};
use crate::rag::workers::WorkerPool;

/// Generative language model: prompt in, full completion out.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Whether the backing service answers at all.
    async fn health_check(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// HTTP client for a locally served (Ollama) or OpenAI-compatible model.
pub struct LlmClient {
    client: Client,
    provider: GenerationProvider,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    timeout: Duration,
    pool: WorkerPool,
}

fn transport_error(err: reqwest::Error) -> RagError {
    if err.is_timeout() {
        RagError::Upstream {
            service: "generator",
            message: format!("request timed out: {}", err),
            retryable: true,
        }
    } else {
        RagError::Upstream {
            service: "generator",
            message: err.to_string(),
            retryable: err.is_connect(),
        }
    }
}

impl LlmClient {
    pub fn new(settings: &GenerationSettings, pool: WorkerPool) -> Self {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        Self {
            client,
            provider: settings.provider,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            temperature: settings.temperature,
            timeout,
            pool,
        }
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(&self, url: &str, body: &B) -> Result<R> {
        let mut req = self.client.post(url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::Upstream {
                service: "generator",
                message: format!("request failed: {} - {}", status, error_text),
                retryable: status.is_server_error() || status.as_u16() == 429,
            });
        }

        response.json::<R>().await.map_err(transport_error)
    }

    async fn ollama_generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self.temperature.map(|temperature| OllamaOptions { temperature }),
        };
        let response: OllamaGenerateResponse = self.post(&url, &body).await?;
        Ok(response.response)
    }

    async fn chat_completion(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
            stream: false,
        };
        let response: ChatCompletionResponse = self.post(&url, &body).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RagError::upstream("generator", "response contained no choices"))
    }

    async fn ping(&self) -> bool {
        let url = match self.provider {
            GenerationProvider::Ollama => format!("{}/api/tags", self.base_url),
            GenerationProvider::Openai => format!("{}/models", self.base_url),
        };
        let mut req = self.client.get(&url).timeout(Duration::from_secs(5));
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        match req.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Generator health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Generator for LlmClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Invoking generator");
        let call = async {
            match self.provider {
                GenerationProvider::Ollama => self.ollama_generate(prompt).await,
                GenerationProvider::Openai => self.chat_completion(prompt).await,
            }
        };
        self.pool.run("generator", self.timeout, call).await
    }

    async fn health_check(&self) -> bool {
        self.ping().await
    }
}
