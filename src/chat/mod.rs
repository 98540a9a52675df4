// Chat engine
// Text and image RAG flows over the knowledge store and a hosted model


pub mod generator;
pub mod link;
pub mod prompt;
pub mod retriever;
pub mod vision;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{Config, GenerationConfig, LinkConfig, RetrievalConfig};
use crate::knowledge::{KnowledgeDocument, KnowledgeStore};
use crate::model::{InferenceConfig, ModelProvider};
use crate::{RagError, Result};

use generator::{Generation, ResponseGenerator};
use prompt::{ComposedPrompt, PromptComposer};
use retriever::{Retrieval, Retriever};
use vision::{VehicleLabel, VisionIdentifier};

pub const GUARDRAIL_REFUSAL_MESSAGE: &str =
    "죄송합니다. 해당 요청은 안전 정책에 따라 답변드릴 수 없습니다.";
pub const AI_SERVER_ERROR_MESSAGE: &str =
    "죄송합니다. AI 서버와 통신 중 오류가 발생했습니다. 잠시 후 다시 시도해 주세요.";
pub const NOT_A_CAR_MESSAGE: &str =
    "이미지에서 차량을 식별할 수 없습니다. 차량이 잘 보이는 다른 사진으로 다시 시도해 주세요.";
pub const KNOWLEDGE_ADDED_MESSAGE: &str = "지식이 성공적으로 추가되었습니다.";

/// Failure of one pipeline stage
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Retrieval failed: {0}")]
    RetrievalFailed(#[source] RagError),
    #[error("Generation failed: {0}")]
    GenerationFailed(#[source] RagError),
}

impl ChatError {
    /// Message shown to the caller in place of an answer
    #[inline]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RetrievalFailed(_) | Self::GenerationFailed(_) => AI_SERVER_ERROR_MESSAGE,
        }
    }
}

/// Caller-facing chat answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub context_used: Vec<String>,
    pub identified_car: Option<String>,
}

impl ChatResponse {
    fn new(response: impl Into<String>, context_used: Vec<String>) -> Self {
        Self {
            response: response.into(),
            context_used,
            identified_car: None,
        }
    }

    fn with_identified_car(mut self, label: &str) -> Self {
        self.identified_car = Some(label.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddKnowledgeResponse {
    pub message: String,
    pub source: String,
}

/// Pipeline position of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Retrieving,
    Composing,
    Generating,
    Done,
    RejectedNotACar,
}

impl fmt::Display for ChatState {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Retrieving => "retrieving",
            Self::Composing => "composing",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::RejectedNotACar => "rejected_not_a_car",
        };
        f.write_str(name)
    }
}

fn enter(state: ChatState) {
    debug!(state = %state, "chat pipeline");
}

pub struct ChatEngine {
    store: Arc<KnowledgeStore>,
    retriever: Retriever,
    vision: VisionIdentifier,
    composer: PromptComposer,
    generator: ResponseGenerator,
    retrieval: RetrievalConfig,
    generation: GenerationConfig,
    links: LinkConfig,
}

impl ChatEngine {
    #[inline]
    pub fn new(store: Arc<KnowledgeStore>, model: Arc<dyn ModelProvider>, config: &Config) -> Self {
        let vision = VisionIdentifier::new(
            Arc::clone(&model),
            config.bedrock.vision_model.clone(),
            InferenceConfig {
                max_tokens: config.generation.vision_max_tokens,
                temperature: config.generation.vision_temperature,
            },
        );

        Self {
            retriever: Retriever::new(Arc::clone(&store)),
            store,
            vision,
            composer: PromptComposer::new(config.comparison.clone(), config.guardrail.clone()),
            generator: ResponseGenerator::new(model, config.bedrock.text_model.clone()),
            retrieval: config.retrieval,
            generation: config.generation,
            links: config.links,
        }
    }

    #[inline]
    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Answer a text message from retrieved knowledge
    #[inline]
    pub async fn chat(&self, message: &str) -> ChatResponse {
        enter(ChatState::Idle);
        info!("Chat request ({} chars)", message.chars().count());

        enter(ChatState::Retrieving);
        let retrieval = match self.retriever.retrieve(message, self.retrieval.chat_k).await {
            Ok(retrieval) => retrieval,
            Err(e) => return Self::fallback(&e, Vec::new()),
        };

        enter(ChatState::Composing);
        let prompt = self.composer.compose_chat(message, &retrieval.documents);

        let Retrieval { documents, sources } = retrieval;
        match self.generate(&prompt, &documents).await {
            Ok(Some(text)) => ChatResponse::new(text, sources),
            Ok(None) => ChatResponse::new(GUARDRAIL_REFUSAL_MESSAGE, Vec::new()),
            Err(e) => Self::fallback(&e, sources),
        }
    }

    /// Identify the vehicle in an image and describe it from retrieved knowledge
    #[inline]
    pub async fn chat_with_image(&self, bytes: &[u8], mime_type: &str) -> ChatResponse {
        enter(ChatState::Idle);
        info!("Image chat request ({} bytes, {})", bytes.len(), mime_type);

        let label = match self.vision.identify(bytes, mime_type).await {
            VehicleLabel::Identified(label) => label,
            VehicleLabel::NotCar => {
                enter(ChatState::RejectedNotACar);
                return ChatResponse::new(NOT_A_CAR_MESSAGE, Vec::new());
            }
        };

        enter(ChatState::Retrieving);
        let retrieval = match self.retriever.retrieve(&label, self.retrieval.image_k).await {
            Ok(retrieval) => retrieval,
            Err(e) => return Self::fallback(&e, Vec::new()).with_identified_car(&label),
        };

        enter(ChatState::Composing);
        let prompt = self.composer.compose_description(&label, &retrieval.documents);

        let Retrieval { documents, sources } = retrieval;
        let response = match self.generate(&prompt, &documents).await {
            Ok(Some(text)) => ChatResponse::new(text, sources),
            Ok(None) => ChatResponse::new(GUARDRAIL_REFUSAL_MESSAGE, Vec::new()),
            Err(e) => Self::fallback(&e, sources),
        };
        response.with_identified_car(&label)
    }

    /// Append one document to the knowledge store
    #[inline]
    pub async fn add_knowledge(&self, content: &str, source: &str) -> Result<AddKnowledgeResponse> {
        if content.trim().is_empty() {
            return Err(RagError::Ingest("Knowledge content must not be empty".to_string()));
        }
        if source.trim().is_empty() {
            return Err(RagError::Ingest("Knowledge source must not be empty".to_string()));
        }

        self.store
            .add_documents(&[KnowledgeDocument::new(content, source)])
            .await?;
        info!("Added knowledge document from {}", source);

        Ok(AddKnowledgeResponse {
            message: KNOWLEDGE_ADDED_MESSAGE.to_string(),
            source: source.to_string(),
        })
    }

    /// Generated text, or `None` when the guardrail intervened
    async fn generate(
        &self,
        prompt: &ComposedPrompt,
        documents: &[KnowledgeDocument],
    ) -> std::result::Result<Option<String>, ChatError> {
        enter(ChatState::Generating);
        let generation = self
            .generator
            .generate(
                prompt,
                self.generation.chat_max_tokens,
                self.generation.chat_temperature,
            )
            .await?;

        enter(ChatState::Done);
        match generation {
            Generation::Completed(text) => Ok(Some(self.check_links(text, documents))),
            Generation::GuardrailIntervened => Ok(None),
        }
    }

    fn check_links(&self, text: String, documents: &[KnowledgeDocument]) -> String {
        let result = link::check(&text);
        if !result.is_compliant() {
            warn!(
                "Answer exposes {} bare URL(s): {:?}",
                result.bare_urls.len(),
                result.bare_urls
            );
        }

        let linkable = documents
            .iter()
            .any(|d| link::ContractLink::from_document(d).is_some());
        if result.has_link() || !linkable {
            return text;
        }

        warn!("Answer is missing the image link for the retrieved vehicles");
        if self.links.enforce_link_contract {
            link::ensure_link(text, documents)
        } else {
            text
        }
    }

    fn fallback(e: &ChatError, context_used: Vec<String>) -> ChatResponse {
        error!("Chat pipeline failed: {}", e);
        ChatResponse::new(e.user_message(), context_used)
    }
}
