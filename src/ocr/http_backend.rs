//! OpenAI-compatible vision backend

use super::OcrModel;
use crate::config::{OcrConfig, OcrModelConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Error object some providers return with a 200 status
#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiError {
    fn is_rate_limit(&self) -> bool {
        match &self.code {
            Some(serde_json::Value::Number(n)) => n.as_u64() == Some(429),
            Some(serde_json::Value::String(s)) => s == "429" || s == "rate_limit_exceeded",
            _ => false,
        }
    }
}

/// One model behind an OpenAI-compatible `/chat/completions` endpoint
pub struct HttpVisionModel {
    client: Client,
    url: Url,
    model: String,
    api_key: Option<String>,
    prompt: String,
    retries: usize,
    limiter: Option<DirectLimiter>,
}

impl HttpVisionModel {
    pub fn new(
        model: &str,
        endpoint: &str,
        api_key: Option<String>,
        config: &OcrConfig,
    ) -> Result<Self> {
        let base = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{}/", endpoint)
        };
        let url = Url::parse(&base)?
            .join("chat/completions")
            .map_err(|e| Error::Config(format!("Invalid OCR endpoint '{}': {}", endpoint, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let limiter = config
            .requests_per_minute
            .and_then(NonZeroU32::new)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            url,
            model: model.to_string(),
            api_key,
            prompt: config.prompt.clone(),
            retries: config.max_transport_retries,
            limiter,
        })
    }

    /// Build from a chain entry, reading the API key from its environment variable
    pub fn from_config(model: &OcrModelConfig, config: &OcrConfig) -> Result<Self> {
        let api_key = if model.api_key_env.is_empty() {
            None
        } else {
            match std::env::var(&model.api_key_env) {
                Ok(key) if !key.trim().is_empty() => Some(key),
                _ => {
                    debug!(
                        model = %model.name,
                        var = %model.api_key_env,
                        "API key variable not set, sending unauthenticated requests"
                    );
                    None
                }
            }
        };

        Self::new(&model.name, &model.endpoint, api_key, config)
    }

    fn build_request(&self, image: &[u8]) -> ChatRequest {
        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(image));
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: self.prompt.clone(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            temperature: 0.0,
        }
    }

    fn parse_response(&self, response: ChatResponse) -> Result<String> {
        if let Some(error) = response.error {
            let message = error.message.clone().unwrap_or_default();
            if error.is_rate_limit() {
                return Err(Error::RateLimited(format!("{}: {}", self.model, message)));
            }
            return Err(Error::Ocr(format!("{}: {}", self.model, message)));
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Ocr(format!("{}: response had no choices", self.model)))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl OcrModel for HttpVisionModel {
    async fn recognize(&self, image: &[u8]) -> Result<String> {
        let body = self.build_request(image);
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.retries {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            let mut request = self.client.post(self.url.clone()).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(Error::RateLimited(format!(
                            "{} returned HTTP 429",
                            self.model
                        )));
                    }
                    if status.is_server_error() {
                        last_err = Some(Error::Ocr(format!("{}: HTTP {}", self.model, status)));
                    } else if !status.is_success() {
                        let text = response.text().await.unwrap_or_default();
                        return Err(Error::Ocr(format!(
                            "{}: HTTP {}: {}",
                            self.model, status, text
                        )));
                    } else {
                        let parsed: ChatResponse = response.json().await?;
                        return self.parse_response(parsed);
                    }
                }
                Err(e) => last_err = Some(Error::Ocr(format!("{}: {}", self.model, e))),
            }

            if attempt < self.retries {
                warn!(model = %self.model, attempt = attempt + 1, "OCR request failed, retrying");
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Ocr(format!("{}: request failed", self.model))))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
