//! AI assistant proxy
//!
//! Relays a chat message list to a hosted chat-completion API and hands back
//! the single completion message. No retries, no streaming and no
//! validation of the upstream response beyond picking out
//! `choices[0].message`.

mod server;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Error;

pub use server::{router, serve};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_PORT: u16 = 3001;

/// Upstream provider and listener settings
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: String,
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    pub model: String,
    pub port: u16,
}

impl AssistantConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            port: DEFAULT_PORT,
        }
    }

    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_MODEL` and `PORT`,
    /// honouring a `.env` file.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::general("OPENAI_API_KEY must be set"))?;
        let mut config = Self::new(&api_key);

        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config = config.with_base_url(&base_url);
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config = config.with_model(&model);
        }
        if let Ok(port) = std::env::var("PORT") {
            let port = port
                .parse()
                .map_err(|_| Error::general(format!("invalid PORT: {}", port)))?;
            config = config.with_port(port);
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, value: &str) -> Self {
        self.base_url = value.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, value: &str) -> Self {
        self.model = value.to_string();
        self
    }

    pub fn with_port(mut self, value: u16) -> Self {
        self.port = value;
        self
    }
}

/// Body accepted by the proxy route
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Chat messages, passed through to the provider untouched
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// Successful proxy response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub message: Value,
}

/// Client for the upstream chat-completion endpoint
#[derive(Debug, Clone)]
pub struct AssistantClient {
    config: AssistantConfig,
    client: Client,
}

impl AssistantClient {
    pub fn new(config: AssistantConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Request one completion for `messages` and return its message object.
    ///
    /// Upstream failures become [`Error::Assistant`] carrying the status and
    /// the raw response text.
    pub async fn complete(&self, messages: &[Value]) -> Result<Value, Error> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = json!({
            "model": self.config.model,
            "messages": messages,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::assistant(format!("{} {}", status.as_u16(), text)));
        }

        let completion: Value = response.json().await?;
        completion
            .pointer("/choices/0/message")
            .cloned()
            .ok_or_else(|| Error::assistant("completion contained no choices"))
    }
}
