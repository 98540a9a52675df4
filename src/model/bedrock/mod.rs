
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ContentBlock, ConverseOutput, ConverseRequest, ModelProvider, StopReason};
use crate::RagError;
use crate::config::{BedrockConfig, GuardrailConfig};

const DEFAULT_RETRY_ATTEMPTS: u32 = 1;

/// Bedrock runtime client authenticated with a bearer API key
#[derive(Debug, Clone)]
pub struct BedrockClient {
    base_url: Url,
    api_key: Option<String>,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireConverseRequest<'a> {
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<WireSystemBlock<'a>>,
    inference_config: WireInferenceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    guardrail_config: Option<WireGuardrailConfig<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: Vec<WireContent<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum WireContent<'a> {
    Text(&'a str),
    Image(WireImage),
}

#[derive(Debug, Serialize)]
struct WireImage {
    format: &'static str,
    source: WireImageSource,
}

#[derive(Debug, Serialize)]
struct WireImageSource {
    bytes: String,
}

#[derive(Debug, Serialize)]
struct WireSystemBlock<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireInferenceConfig {
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGuardrailConfig<'a> {
    guardrail_identifier: &'a str,
    guardrail_version: &'a str,
    trace: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireConverseResponse {
    #[serde(default)]
    output: Option<WireOutput>,
    stop_reason: String,
}

#[derive(Debug, Deserialize)]
struct WireOutput {
    #[serde(default)]
    message: Option<WireOutputMessage>,
}

#[derive(Debug, Deserialize)]
struct WireOutputMessage {
    #[serde(default)]
    content: Vec<WireOutputContent>,
}

#[derive(Debug, Deserialize)]
struct WireOutputContent {
    #[serde(default)]
    text: Option<String>,
}

impl<'a> WireConverseRequest<'a> {
    fn from_request(request: &'a ConverseRequest) -> Self {
        let messages = request
            .messages
            .iter()
            .map(|message| WireMessage {
                role: message.role.as_str(),
                content: message
                    .content
                    .iter()
                    .map(|block| match block {
                        ContentBlock::Text(text) => WireContent::Text(text),
                        ContentBlock::Image { format, bytes } => WireContent::Image(WireImage {
                            format: format.as_str(),
                            source: WireImageSource {
                                bytes: BASE64.encode(bytes),
                            },
                        }),
                    })
                    .collect(),
            })
            .collect();

        Self {
            messages,
            system: request
                .system
                .as_deref()
                .map(|text| vec![WireSystemBlock { text }])
                .unwrap_or_default(),
            inference_config: WireInferenceConfig {
                max_tokens: request.inference.max_tokens,
                temperature: request.inference.temperature,
            },
            guardrail_config: request.guardrail.as_ref().map(wire_guardrail),
        }
    }
}

fn wire_guardrail(guardrail: &GuardrailConfig) -> WireGuardrailConfig<'_> {
    WireGuardrailConfig {
        guardrail_identifier: &guardrail.id,
        guardrail_version: &guardrail.version,
        trace: if guardrail.trace { "enabled" } else { "disabled" },
    }
}

impl BedrockClient {
    #[inline]
    pub fn new(config: &BedrockConfig) -> Result<Self> {
        let base_url = config
            .endpoint_url()
            .context("Failed to generate Bedrock endpoint from config")?;

        let agent = crate::http::agent(Duration::from_secs(config.timeout_secs));

        Ok(Self {
            base_url,
            api_key: config.api_key(),
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = crate::http::agent(timeout);
        self
    }

    /// Opt in to transport-level retries; the default is a single attempt
    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Run a Converse call on the current thread
    #[inline]
    pub fn converse_blocking(&self, request: &ConverseRequest) -> Result<ConverseOutput> {
        debug!(
            "Converse call to {} with {} message(s)",
            request.model_id,
            request.messages.len()
        );

        let body = serde_json::to_string(&WireConverseRequest::from_request(request))
            .context("Failed to serialize converse request")?;

        let response_text = self
            .post_model(&request.model_id, "converse", &body)
            .context("Converse request failed")?;

        let response: WireConverseResponse =
            serde_json::from_str(&response_text).context("Failed to parse converse response")?;

        let text = response
            .output
            .and_then(|output| output.message)
            .map(|message| {
                message
                    .content
                    .into_iter()
                    .filter_map(|block| block.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        let stop_reason = StopReason::parse(&response.stop_reason);
        debug!(
            "Converse finished with stop reason {:?} ({} chars)",
            stop_reason,
            text.len()
        );

        Ok(ConverseOutput { text, stop_reason })
    }

    /// Invoke a model with a raw JSON body, returning the raw JSON response
    #[inline]
    pub fn invoke_blocking(&self, model_id: &str, body: &serde_json::Value) -> Result<String> {
        let body = serde_json::to_string(body).context("Failed to serialize invoke body")?;
        self.post_model(model_id, "invoke", &body)
            .with_context(|| format!("Invoke request to {} failed", model_id))
    }

    fn model_url(&self, model_id: &str, action: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("Bedrock endpoint cannot be used as a base URL"))?
            .pop_if_empty()
            .extend(["model", model_id, action]);
        Ok(url)
    }

    fn post_model(&self, model_id: &str, action: &str, body: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("Bedrock API key is not configured"))?;
        let url = self.model_url(model_id, action)?;
        let authorization = format!("Bearer {}", api_key);

        crate::http::with_retry("Bedrock", self.retry_attempts, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .header("Accept", "application/json")
                .header("Authorization", &authorization)
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }
}

#[async_trait]
impl ModelProvider for BedrockClient {
    async fn converse(&self, request: ConverseRequest) -> crate::Result<ConverseOutput> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.converse_blocking(&request))
            .await
            .map_err(|e| RagError::Model(format!("Converse task failed: {}", e)))?
            .map_err(|e| RagError::Model(format!("{:#}", e)))
    }
}
