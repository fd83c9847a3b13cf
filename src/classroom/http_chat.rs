//! [`ChatClient`] over an OpenAI-compatible `/chat/completions` endpoint.
//!
//! Works with OpenAI, Azure OpenAI deployments exposed through the compatible route,
//! and local servers speaking the same protocol. Requests always ask for a JSON
//! object reply, which is what the chat adapters expect.
//!
//! ```rust,no_run
//! use classroom_sim::http_chat::OpenAiChatClient;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let client = OpenAiChatClient::new(
//!     "https://api.openai.com/v1",
//!     std::env::var("OPENAI_API_KEY")?,
//!     "gpt-4o-mini",
//! )?
//! .with_temperature(0.9);
//! let _shared = Arc::new(client);
//! # Ok(())
//! # }
//! ```

use crate::classroom::chat::{ChatClient, ChatMessage, Role};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::error::Error;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum HttpChatError {
    Status(u16, String),
    EmptyReply,
}

impl fmt::Display for HttpChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpChatError::Status(code, body) => {
                write!(f, "Chat endpoint returned status {}: {}", code, body)
            }
            HttpChatError::EmptyReply => write!(f, "Chat endpoint returned no choices"),
        }
    }
}

impl Error for HttpChatError {}

pub struct OpenAiChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl OpenAiChatClient {
    /// Build a client with a 30 second request timeout.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.8,
        })
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn request_body(&self, messages: &[ChatMessage]) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
        })
    }
}

/// Pull `choices[0].message.content` out of a completion response.
pub fn reply_content(response: &Value) -> Result<String, HttpChatError> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or(HttpChatError::EmptyReply)
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn send(&self, messages: Vec<ChatMessage>) -> Result<String, Box<dyn Error + Send + Sync>> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&messages))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Box::new(HttpChatError::Status(status.as_u16(), body)));
        }

        let payload: Value = response.json().await?;
        Ok(reply_content(&payload)?)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
