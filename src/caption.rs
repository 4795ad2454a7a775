//! Caption generation against an OpenAI-compatible chat-completions endpoint.

use std::time::Instant;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;
use serde_json::Value;

use crate::config::{CaptionSettings, ServiceCredential};
use crate::error::Failure;
use crate::image_input::ImageAsset;

pub const CAPTION_PROMPT: &str = "Provide a detailed and descriptive caption for this image, \
including objects, colors, and the overall scene.";

pub const CAPTION_TEMPERATURE: f32 = 0.5;

/// Longest slice of a provider's error body echoed back to the user.
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caption {
    pub text: String,
    pub model: String,
}

pub type CaptionResult = Result<Caption, Failure>;

#[async_trait]
pub trait CaptionService: Send + Sync {
    /// Makes at most one request to the captioning provider. Nothing is
    /// retried; any failure is final for this call.
    async fn caption(
        &self,
        asset: &ImageAsset,
        credential: Option<&ServiceCredential>,
    ) -> CaptionResult;
}

pub struct OpenRouterCaptionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OpenRouterCaptionClient {
    pub fn new(settings: &CaptionSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                settings.api_base.trim_end_matches('/')
            ),
            model: settings.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn request_body(&self, asset: &ImageAsset) -> Value {
        let image_base64 = general_purpose::STANDARD.encode(asset.bytes());

        serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:{};base64,{}", asset.format().mime_type(), image_base64)
                        }
                    },
                    {
                        "type": "text",
                        "text": CAPTION_PROMPT
                    }
                ]
            }],
            "temperature": CAPTION_TEMPERATURE
        })
    }
}

#[async_trait]
impl CaptionService for OpenRouterCaptionClient {
    async fn caption(
        &self,
        asset: &ImageAsset,
        credential: Option<&ServiceCredential>,
    ) -> CaptionResult {
        let Some(credential) = credential else {
            tracing::warn!("Caption requested without an API key");
            return Err(Failure::MissingCredential);
        };

        let body = self.request_body(asset);
        let started = Instant::now();

        tracing::info!(
            model = %self.model,
            image_bytes = asset.len(),
            mime_type = asset.format().mime_type(),
            "Sending caption request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_failure(&e, credential))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| transport_failure(&e, credential))?;

        tracing::debug!(
            status = %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            body_bytes = response_text.len(),
            "Caption response received"
        );

        if !status.is_success() {
            let details = format!("API error {}: {}", status, provider_message(&response_text));
            tracing::warn!(status = %status, "Captioning service rejected the request");
            return Err(Failure::Service(redact(&details, credential)));
        }

        let result: Value = serde_json::from_str(&response_text)
            .map_err(|e| Failure::Service(format!("malformed response: {e}")))?;

        let text = result
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| Failure::Service("response contained no caption".to_string()))?;

        tracing::info!(
            caption_chars = text.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Caption generated"
        );

        Ok(Caption {
            text: text.to_string(),
            model: self.model.clone(),
        })
    }
}

fn transport_failure(err: &reqwest::Error, credential: &ServiceCredential) -> Failure {
    if err.is_timeout() {
        tracing::warn!("Caption request timed out");
        return Failure::Service("timeout".to_string());
    }
    tracing::warn!(error = %err, "Caption request failed");
    Failure::Service(redact(&error_chain(err), credential))
}

/// Renders an error and its sources, e.g. "error sending request: connection refused".
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !out.contains(&cause_text) {
            out.push_str(": ");
            out.push_str(&cause_text);
        }
        source = cause.source();
    }
    out
}

/// Prefers the provider's `error.message`; otherwise a bounded slice of the body.
fn provider_message(body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        json.pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    from_json.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            "empty response body".to_string()
        } else {
            trimmed.chars().take(MAX_ERROR_BODY).collect()
        }
    })
}

fn redact(message: &str, credential: &ServiceCredential) -> String {
    message.replace(credential.expose(), "[redacted]")
}
