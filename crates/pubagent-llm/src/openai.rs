
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

use pubagent_core::config::GenerationSettings;
use pubagent_core::traits::{GenerationRequest, GenerationResponse, Generator};
use pubagent_core::{Error, Result};

/// Client for `POST {api_base}/chat/completions`.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
}

impl ChatCompletionsGenerator {
    /// Read the API key from the environment variable named by `api_key_env`.
    pub fn from_settings(settings: &GenerationSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidConfig(format!("environment variable {} is not set", settings.api_key_env))
            })?;
        Self::new(settings, api_key)
    }

    pub fn new(settings: &GenerationSettings, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.attempt_timeout())
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/chat/completions", settings.api_base.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key,
            temperature: settings.temperature,
        })
    }

    fn body(&self, request: &GenerationRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_instructions },
                { "role": "user", "content": request.assembled_prompt },
            ],
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        body
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| Error::Generation(format!("request to {} failed: {e}", self.url)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| Error::UnexpectedResponse(format!("body is not JSON: {e}")))?;
        debug!(model = %self.model, usage = %json["usage"], "chat completion received");
        parse_completion(&json)
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            Error::InvalidConfig(format!("generation service answered {status}: {body}"))
        }
        _ => Error::Generation(format!("generation service answered {status}: {body}")),
    }
}

/// Pull `choices[0].message.content` out of a chat-completions body.
pub(crate) fn parse_completion(json: &Value) -> Result<GenerationResponse> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| Error::UnexpectedResponse("no choices in response".to_string()))?;
    match &choice["message"]["content"] {
        Value::String(text) => Ok(GenerationResponse::PlainText(text.clone())),
        Value::Object(fields) => Ok(GenerationResponse::Structured(fields.clone())),
        other => Err(Error::UnexpectedResponse(format!("message content is {other}"))),
    }
}
