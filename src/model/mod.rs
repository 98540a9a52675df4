// Hosted model provider interface
// Converse-style request/response types shared by chat generation and vision

pub mod bedrock;

use async_trait::async_trait;

use crate::config::GuardrailConfig;

pub use bedrock::BedrockClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
}

impl Role {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Map an HTTP MIME type onto a supported image format
    #[inline]
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        match mime_type.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
    Image { format: ImageFormat, bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    #[inline]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text(text.into())],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceConfig {
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConverseRequest {
    pub model_id: String,
    pub messages: Vec<Message>,
    pub system: Option<String>,
    pub inference: InferenceConfig,
    pub guardrail: Option<GuardrailConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    GuardrailIntervened,
    ContentFiltered,
    Other(String),
}

impl StopReason {
    #[inline]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" => Self::EndTurn,
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            "guardrail_intervened" => Self::GuardrailIntervened,
            "content_filtered" => Self::ContentFiltered,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverseOutput {
    pub text: String,
    pub stop_reason: StopReason,
}

/// A hosted model reachable through a single-turn converse call
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn converse(&self, request: ConverseRequest) -> crate::Result<ConverseOutput>;
}
